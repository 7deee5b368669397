//! FILENAME: pivot-engine/src/aggregation.rs
//! PURPOSE: Aggregation functions applied to the values of one group.
//! CONTEXT: Built-in functions know their result dtype from the source dtype,
//! which lets the engine write straight into a typed column. Custom closures
//! may declare a dtype; when they do not, the engine infers it afterwards.

use std::fmt;
use std::sync::Arc;

use frame_engine::{Array, DType, Element, FrameError, Values};
use serde::{Deserialize, Serialize};

// ============================================================================
// BUILT-IN AGGREGATION
// ============================================================================

/// Supported built-in aggregation functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregationType {
    Sum,
    Count,
    Mean,
    Min,
    Max,
    Product,
    /// Population standard deviation.
    StdDev,
    /// Population variance.
    Var,
    First,
    Last,
}

impl Default for AggregationType {
    fn default() -> Self {
        AggregationType::Sum
    }
}

/// Numeric payload of a group, widened to one of two accumulator types.
enum Numbers {
    Ints(Vec<i64>),
    Floats(Vec<f64>),
}

impl Numbers {
    fn from_array(values: &Array, operation: &'static str) -> Result<Self, FrameError> {
        let unsupported = || FrameError::UnsupportedDType {
            operation,
            dtype: values.dtype(),
        };
        Ok(match values.values() {
            Values::Bool(v) => Numbers::Ints(v.iter().map(|b| *b as i64).collect()),
            Values::Int(v) => Numbers::Ints(v.iter().copied().collect()),
            Values::Float(v) => Numbers::Floats(v.iter().copied().collect()),
            Values::Object(v) => {
                if v.iter().all(|e| matches!(e, Element::Bool(_) | Element::Int(_))) {
                    Numbers::Ints(v.iter().filter_map(Element::as_i64).collect())
                } else {
                    let floats: Option<Vec<f64>> = v.iter().map(Element::as_f64).collect();
                    Numbers::Floats(floats.ok_or_else(unsupported)?)
                }
            }
            Values::Str(_) | Values::Date(_) => return Err(unsupported()),
        })
    }

    fn to_floats(&self) -> Vec<f64> {
        match self {
            Numbers::Ints(v) => v.iter().map(|i| *i as f64).collect(),
            Numbers::Floats(v) => v.clone(),
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Two-pass population variance.
fn population_var(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mean = mean(values);
    values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / values.len() as f64
}

impl AggregationType {
    pub const ALL: [AggregationType; 10] = [
        AggregationType::Sum,
        AggregationType::Count,
        AggregationType::Mean,
        AggregationType::Min,
        AggregationType::Max,
        AggregationType::Product,
        AggregationType::StdDev,
        AggregationType::Var,
        AggregationType::First,
        AggregationType::Last,
    ];

    /// Short name used as the column label of a mapped function.
    pub fn label(&self) -> &'static str {
        match self {
            AggregationType::Sum => "sum",
            AggregationType::Count => "count",
            AggregationType::Mean => "mean",
            AggregationType::Min => "min",
            AggregationType::Max => "max",
            AggregationType::Product => "prod",
            AggregationType::StdDev => "std",
            AggregationType::Var => "var",
            AggregationType::First => "first",
            AggregationType::Last => "last",
        }
    }

    /// Parse a function name; accepts the label and a few common spellings.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name.to_lowercase().as_str() {
            "sum" => AggregationType::Sum,
            "count" => AggregationType::Count,
            "mean" | "average" | "avg" => AggregationType::Mean,
            "min" => AggregationType::Min,
            "max" => AggregationType::Max,
            "prod" | "product" => AggregationType::Product,
            "std" | "stddev" | "stdev" => AggregationType::StdDev,
            "var" => AggregationType::Var,
            "first" => AggregationType::First,
            "last" => AggregationType::Last,
            _ => return None,
        })
    }

    /// Dtype of the result when applied to values of `source`, if it can be known up front.
    pub fn result_dtype(&self, source: DType) -> Option<DType> {
        match self {
            AggregationType::Count => Some(DType::Int64),
            AggregationType::Sum | AggregationType::Product => match source {
                DType::Bool | DType::Int64 => Some(DType::Int64),
                DType::Float64 => Some(DType::Float64),
                _ => None,
            },
            AggregationType::Mean | AggregationType::StdDev | AggregationType::Var => {
                source.is_numeric().then_some(DType::Float64)
            }
            AggregationType::Min | AggregationType::Max | AggregationType::First | AggregationType::Last => {
                Some(source)
            }
        }
    }

    pub fn apply(&self, values: &Array) -> Result<Element, FrameError> {
        let len = values.len();
        Ok(match self {
            AggregationType::Count => Element::Int(len as i64),
            AggregationType::First => {
                if len == 0 {
                    Element::Null
                } else {
                    values.element(0)
                }
            }
            AggregationType::Last => {
                if len == 0 {
                    Element::Null
                } else {
                    values.element(len - 1)
                }
            }
            AggregationType::Min => values.iter().min().unwrap_or(Element::Null),
            AggregationType::Max => values.iter().max().unwrap_or(Element::Null),
            AggregationType::Sum => match Numbers::from_array(values, "sum")? {
                Numbers::Ints(v) => Element::Int(v.iter().fold(0i64, |acc, x| acc.wrapping_add(*x))),
                Numbers::Floats(v) => Element::Float(v.iter().sum()),
            },
            AggregationType::Product => match Numbers::from_array(values, "prod")? {
                Numbers::Ints(v) => Element::Int(v.iter().fold(1i64, |acc, x| acc.wrapping_mul(*x))),
                Numbers::Floats(v) => Element::Float(v.iter().product()),
            },
            AggregationType::Mean => {
                let floats = Numbers::from_array(values, "mean")?.to_floats();
                if floats.is_empty() {
                    Element::nan()
                } else {
                    Element::Float(mean(&floats))
                }
            }
            AggregationType::Var => Element::Float(population_var(&Numbers::from_array(values, "var")?.to_floats())),
            AggregationType::StdDev => {
                Element::Float(population_var(&Numbers::from_array(values, "std")?.to_floats()).sqrt())
            }
        })
    }
}

// ============================================================================
// AGGREGATOR
// ============================================================================

type AggregateFn = dyn Fn(&Array) -> Element + Send + Sync;

/// A named user closure, with an optional declared result dtype.
#[derive(Clone)]
pub struct CustomAggregation {
    name: String,
    func: Arc<AggregateFn>,
    dtype: Option<DType>,
}

impl fmt::Debug for CustomAggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomAggregation")
            .field("name", &self.name)
            .field("dtype", &self.dtype)
            .finish()
    }
}

/// Any function pivot can apply to a group.
#[derive(Debug, Clone)]
pub enum Aggregator {
    Builtin(AggregationType),
    Custom(CustomAggregation),
}

impl Aggregator {
    pub fn custom<F>(name: impl Into<String>, dtype: Option<DType>, func: F) -> Self
    where
        F: Fn(&Array) -> Element + Send + Sync + 'static,
    {
        Aggregator::Custom(CustomAggregation {
            name: name.into(),
            func: Arc::new(func),
            dtype,
        })
    }

    pub fn label(&self) -> Element {
        match self {
            Aggregator::Builtin(agg) => Element::str(agg.label()),
            Aggregator::Custom(custom) => Element::str(custom.name.clone()),
        }
    }

    pub fn result_dtype(&self, source: DType) -> Option<DType> {
        match self {
            Aggregator::Builtin(agg) => agg.result_dtype(source),
            Aggregator::Custom(custom) => custom.dtype,
        }
    }

    pub fn apply(&self, values: &Array) -> Result<Element, FrameError> {
        match self {
            Aggregator::Builtin(agg) => agg.apply(values),
            Aggregator::Custom(custom) => Ok((custom.func)(values)),
        }
    }
}

impl From<AggregationType> for Aggregator {
    fn from(agg: AggregationType) -> Self {
        Aggregator::Builtin(agg)
    }
}
