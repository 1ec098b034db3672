//! Built-in lab identities and the two representative strategies.
//!
//! Every other lab is contributed as data through the registry.

use std::sync::Arc;

use super::hosted::{HostedPageStrategy, HostedSpec, HostedTableSpec};
use super::layout::{LayoutPdfStrategy, LayoutSpec, RegionSpec, TableSpec};
use super::rows::Column;
use crate::error::ParseError;
use crate::models::{FractionalRect, LabIdentity};
use crate::pipeline::dispatch::StrategyRegistry;

pub const CONFIDENT_CANNABIS: &str = "confident_cannabis";
pub const SC_LABS: &str = "sclabs";

/// Identity table, most specific signatures first.
pub fn default_labs() -> Vec<LabIdentity> {
    vec![
        LabIdentity::new("Confident Cannabis", CONFIDENT_CANNABIS)
            .with_url("orders.confidentcannabis.com")
            .with_text("Confident Cannabis"),
        LabIdentity::new("TagLeaf LIMS", "tagleaf")
            .with_url("lims.tagleaf.com")
            .with_text("TagLeaf"),
        LabIdentity::new("SC Labs", SC_LABS)
            .with_url("client.sclabs.com")
            .with_url("sclabs.com")
            .with_text("SC Labs"),
        LabIdentity::new("Green Leaf Lab", "green_leaf_lab")
            .with_url("greenleaflab.org")
            .with_text("Green Leaf Lab"),
        LabIdentity::new("Kaycha Labs", "kaycha")
            .with_url("yourcoa.com")
            .with_text("Kaycha Labs"),
        LabIdentity::new("MCR Labs", "mcr_labs")
            .with_url("reports.mcrlabs.com")
            .with_text("MCR Labs"),
        LabIdentity::new("Steep Hill", "steep_hill").with_text("Steep Hill"),
        LabIdentity::new("Anresco Laboratories", "anresco").with_text("ANRESCO"),
        LabIdentity::new("Veda Scientific", "veda").with_text("Veda Scientific"),
        LabIdentity::new("Sonoma Lab Works", "sonoma_lab_works").with_text("Sonoma Lab Works"),
    ]
}

/// SC Labs single-page certificate: sample details on the left, dates on
/// the right, potency table below.
pub fn sclabs_layout_spec() -> LayoutSpec {
    LayoutSpec {
        field_regions: vec![
            RegionSpec::new("sample", 0, FractionalRect::new(0.0, 0.0, 0.5, 0.35)),
            RegionSpec::new("dates", 0, FractionalRect::new(0.5, 0.0, 1.0, 0.35)),
        ],
        tables: vec![TableSpec {
            category: "cannabinoids".into(),
            region: RegionSpec::new("potency", 0, FractionalRect::new(0.0, 0.35, 1.0, 1.0)),
            columns: vec![Column::Value],
        }],
    }
}

/// Confident Cannabis public report page.
pub fn confident_cannabis_spec() -> HostedSpec {
    let analyte_columns = vec![Column::Loq, Column::Value, Column::Units];
    HostedSpec {
        field_selector: ".sample-details .detail".into(),
        label_selector: ".label".into(),
        value_selector: ".value".into(),
        tables: vec![
            HostedTableSpec {
                category: "cannabinoids".into(),
                row_selector: "table.cannabinoids tbody tr".into(),
                columns: analyte_columns.clone(),
            },
            HostedTableSpec {
                category: "terpenes".into(),
                row_selector: "table.terpenes tbody tr".into(),
                columns: analyte_columns,
            },
            HostedTableSpec {
                category: "pesticides".into(),
                row_selector: "table.pesticides tbody tr".into(),
                columns: vec![Column::Lod, Column::Limit, Column::Value, Column::Status],
            },
        ],
    }
}

/// Registry holding the built-in strategies.
pub fn builtin_registry() -> Result<StrategyRegistry, ParseError> {
    let mut registry = StrategyRegistry::new();
    registry.register(SC_LABS, Arc::new(LayoutPdfStrategy::new(sclabs_layout_spec())));
    registry.register(
        CONFIDENT_CANNABIS,
        Arc::new(HostedPageStrategy::new(&confident_cannabis_spec())?),
    );
    Ok(registry)
}
