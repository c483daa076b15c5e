//! Conversion between component parameter maps and optimization vectors.

use arcstr::ArcStr;
use indexmap::IndexMap;

use crate::config::{ComponentParams, ParameterBound};
use crate::error::{Error, Result};

/// Decimal places used to render a value within a range of width `range`.
pub fn precision(range: f64) -> usize {
    if range > 100. {
        3
    } else if range > 1. {
        6
    } else {
        9
    }
}

/// Renders `value` with the precision implied by `bound`'s range.
pub fn format_value(value: f64, bound: &ParameterBound) -> ArcStr {
    arcstr::format!("{:.*}", precision(bound.range()), value)
}

/// Reads the bounded parameters out of `params`, in bound order.
pub fn params_to_vector(params: &ComponentParams, bounds: &[ParameterBound]) -> Result<Vec<f64>> {
    bounds
        .iter()
        .map(|bound| {
            let value = params
                .get(&bound.component)
                .and_then(|p| p.get(&bound.parameter))
                .ok_or_else(|| Error::MissingParameter {
                    component: bound.component.clone(),
                    parameter: bound.parameter.clone(),
                })?;
            value
                .trim()
                .parse::<f64>()
                .map_err(|_| Error::InvalidParameter {
                    component: bound.component.clone(),
                    parameter: bound.parameter.clone(),
                    value: value.clone(),
                })
        })
        .collect()
}

/// Writes the vector `x` into a copy of `base`, in bound order.
///
/// Components named by a bound but absent from `base` are created.
pub fn vector_to_params(x: &[f64], base: &ComponentParams, bounds: &[ParameterBound]) -> ComponentParams {
    let mut params = base.clone();
    for (&value, bound) in x.iter().zip(bounds) {
        params
            .entry(bound.component.clone())
            .or_insert_with(IndexMap::new)
            .insert(bound.parameter.clone(), format_value(value, bound));
    }
    params
}

/// Rounds `value` to `decimals` places and renders it without trailing zeros.
pub fn round_to(value: f64, decimals: i32) -> ArcStr {
    let scale = 10f64.powi(decimals);
    let rounded = (value * scale).round() / scale;
    arcstr::format!("{}", rounded)
}
