//! Table self-check
//!
//! Renders every format table entry with synthetic parameters so a table can
//! be reviewed without a device attached.

use crate::decoder::printf::value_specs;
use crate::decoder::render::{FormatRenderer, RenderOutcome};
use crate::decoder::wire::{pack_params, ParamLayout, ParamValue, Slot};
use crate::id::FormatTable;
use crate::types::TriceId;
use serde::{Deserialize, Serialize};

/// Synthetic parameter sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Dataset {
    /// Parameter `i` is `i + 1`
    #[default]
    Position,
    /// Parameter `i` is `-(i + 1)`
    Negative,
}

impl std::str::FromStr for Dataset {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "position" => Ok(Dataset::Position),
            "negative" => Ok(Dataset::Negative),
            other => Err(format!("unknown dataset `{}`", other)),
        }
    }
}

impl Dataset {
    fn value(self, index: usize) -> i64 {
        let v = index as i64 + 1;
        match self {
            Dataset::Position => v,
            Dataset::Negative => -v,
        }
    }

    /// Parameter values for a layout; float conversions get float values
    pub fn values(self, layout: &ParamLayout, format: &str) -> Vec<ParamValue> {
        let specs = value_specs(format);
        layout
            .slots()
            .iter()
            .enumerate()
            .map(|(i, slot)| match slot {
                Slot::Str => ParamValue::Str(format!("str{}", i + 1)),
                Slot::Value(_) if specs.get(i).is_some_and(|s| s.is_float()) => {
                    ParamValue::Float(self.value(i) as f64 + 0.5)
                }
                Slot::Value(_) => ParamValue::Int(self.value(i)),
            })
            .collect()
    }
}

/// Render all entries of `table` with `dataset`, in ascending ID order.
/// Entries whose macro type cannot be decoded are skipped with a warning.
pub fn check_table(table: &FormatTable, dataset: Dataset) -> Vec<(TriceId, RenderOutcome)> {
    let renderer = FormatRenderer::new();
    let mut out = Vec::with_capacity(table.len());
    for (id, fmt) in table.iter() {
        let layout = match ParamLayout::from_fmt(fmt) {
            Ok(layout) => layout,
            Err(e) => {
                tracing::warn!("ID {}: {}", id, e);
                continue;
            }
        };
        let params = pack_params(&layout, &dataset.values(&layout, &fmt.format_string));
        out.push((id, renderer.render(fmt, &layout, &params)));
    }
    out
}
