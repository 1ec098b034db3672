//! Fixtures shared by pipeline tests: one sample certificate, printed as a
//! layout PDF and published as a hosted page.

use std::io::Cursor;
use std::sync::Arc;

use image::{DynamicImage, GrayImage, ImageOutputFormat, Luma};
use qrcode::{Color, QrCode};

use crate::models::{Document, FractionalRect, Page, Rect, SourceLocator, TextBox};
use crate::pipeline::strategies::{Column, LayoutSpec, RegionSpec, TableSpec};

pub const HOSTED_URL: &str = "https://orders.confidentcannabis.com/report/public/sample/abc123";

const PAGE_WIDTH: f32 = 612.0;
const PAGE_HEIGHT: f32 = 792.0;
const MODULE_PX: u32 = 4;
const QUIET_MODULES: u32 = 4;

/// A letter-size page raster (1px per point) with a QR code for `url`
/// near the top right, and the code's bounds including its quiet zone.
pub fn qr_page_png(url: &str) -> (Vec<u8>, Rect) {
    let code = QrCode::new(url.as_bytes()).unwrap();
    let modules = code.width() as u32;
    let colors = code.to_colors();

    let origin_x = 400u32;
    let origin_y = 40u32;
    let mut raster = GrayImage::from_pixel(PAGE_WIDTH as u32, PAGE_HEIGHT as u32, Luma([255u8]));
    for (i, color) in colors.iter().enumerate() {
        if *color != Color::Dark {
            continue;
        }
        let mx = i as u32 % modules + QUIET_MODULES;
        let my = i as u32 / modules + QUIET_MODULES;
        for dy in 0..MODULE_PX {
            for dx in 0..MODULE_PX {
                raster.put_pixel(
                    origin_x + mx * MODULE_PX + dx,
                    origin_y + my * MODULE_PX + dy,
                    Luma([0u8]),
                );
            }
        }
    }

    let side = ((modules + 2 * QUIET_MODULES) * MODULE_PX) as f32;
    let rect = Rect::new(
        origin_x as f32,
        origin_y as f32,
        origin_x as f32 + side,
        origin_y as f32 + side,
    );

    let mut cursor = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(raster)
        .write_to(&mut cursor, ImageOutputFormat::Png)
        .unwrap();
    (cursor.into_inner(), rect)
}

fn text_box(text: &str, left: f32, top: f32) -> TextBox {
    let width = text.chars().count() as f32 * 5.0;
    TextBox {
        text: text.to_string(),
        rect: Rect::new(left, top, left + width, top + 10.0),
    }
}

/// The sample certificate's text layer.
pub fn layout_coa_page() -> Page {
    let mut boxes = vec![
        text_box("SC Labs", 72.0, 20.0),
        text_box("Client: Grower Co", 72.0, 40.0),
        text_box("Sample Name: Blue Dream", 72.0, 100.0),
        text_box("Batch: BD-0301", 72.0, 120.0),
        text_box("Date Received: 02/27/2024", 340.0, 140.0),
        text_box("Date Tested: 03/01/2024", 340.0, 160.0),
        text_box("Analyte", 72.0, 300.0),
        text_box("Result", 300.0, 300.0),
    ];
    let rows: [(&str, &[&str]); 5] = [
        ("THCa", &["21.3", "%"]),
        ("Δ9-THC", &["0.42", "%"]),
        ("CBD", &["<LOQ"]),
        ("Terpenes", &[]),
        ("Limonene", &["0.45", "%"]),
    ];
    for (i, (name, cells)) in rows.iter().enumerate() {
        let top = 320.0 + i as f32 * 20.0;
        boxes.push(text_box(name, 72.0, top));
        for (j, cell) in cells.iter().enumerate() {
            boxes.push(text_box(cell, 300.0 + j as f32 * 60.0, top));
        }
    }
    Page::from_boxes(0, PAGE_WIDTH, PAGE_HEIGHT, boxes, Vec::new())
}

/// Header fields across the top third, one results table below.
pub fn generic_layout_spec() -> LayoutSpec {
    LayoutSpec {
        field_regions: vec![RegionSpec::new(
            "header",
            0,
            FractionalRect::new(0.0, 0.0, 1.0, 0.35),
        )],
        tables: vec![TableSpec {
            category: "cannabinoids".into(),
            region: RegionSpec::new("results", 0, FractionalRect::new(0.0, 0.35, 1.0, 1.0)),
            columns: vec![Column::Value],
        }],
    }
}

/// The sample certificate as a one-page PDF with a native text layer.
pub fn layout_coa_document() -> Document {
    Document::pdf(
        SourceLocator::from(b"%PDF-1.4".to_vec()),
        Arc::from(&b"%PDF-1.4"[..]),
        vec![layout_coa_page()],
    )
}

/// The same sample as published on its hosted result page.
pub fn hosted_coa_html() -> String {
    r#"<!DOCTYPE html>
<html>
<head><title>Blue Dream | Confident Cannabis</title></head>
<body>
  <header>Confident Cannabis</header>
  <section class="sample-details">
    <div class="detail"><span class="label">Producer</span><span class="value">Grower Co</span></div>
    <div class="detail"><span class="label">Product Name</span><span class="value">Blue Dream</span></div>
    <div class="detail"><span class="label">Product Type</span><span class="value">Flower</span></div>
    <div class="detail"><span class="label">Batch Number:</span><span class="value">BD-0301</span></div>
    <div class="detail"><span class="label">Date Tested</span><span class="value">March 1, 2024</span></div>
    <div class="detail">Lab ID: CC-98765</div>
  </section>
  <table class="cannabinoids">
    <thead><tr><th>Analyte</th><th>LOQ</th><th>Result</th><th>Units</th></tr></thead>
    <tbody>
      <tr><td>THCa</td><td>0.05</td><td>21.3</td><td>%</td></tr>
      <tr><td>Δ9-THC</td><td>0.05</td><td>0.42</td><td>%</td></tr>
      <tr><td>CBD</td><td>0.05</td><td>&lt;LOQ</td><td>%</td></tr>
    </tbody>
  </table>
  <table class="pesticides">
    <thead><tr><th>Analyte</th><th>LOD</th><th>Limit</th><th>Result</th><th>Status</th></tr></thead>
    <tbody>
      <tr><td>Bifenazate</td><td>0.01</td><td>0.1</td><td>ND</td><td>Pass</td></tr>
      <tr><td>Myclobutanil</td><td>0.01</td><td>0.1</td><td>ND</td><td>Pass</td></tr>
    </tbody>
  </table>
</body>
</html>"#
        .to_string()
}
