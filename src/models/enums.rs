use crate::error::ParseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr + Display pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = ParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(ParseError::ParseMismatch(format!(
                        "invalid {} value '{}'",
                        stringify!($name),
                        s
                    ))),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(DocumentKind {
    Pdf => "pdf",
    Html => "html",
});

str_enum!(Limit {
    Detection => "detection",
    Quantitation => "quantitation",
});

str_enum!(Stage {
    LayoutPdf => "layout_pdf",
    EmbeddedReference => "embedded_reference",
    HostedPage => "hosted_page",
    OcrRerender => "ocr_rerender",
});

str_enum!(StrategyFamily {
    LayoutPdf => "layout_pdf",
    HostedPage => "hosted_page",
});
