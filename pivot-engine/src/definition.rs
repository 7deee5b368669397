//! FILENAME: pivot-engine/src/definition.rs
//! Pivot Definition - what a pivot should do.
//!
//! Field groups are given as column labels of the source frame. The
//! definition is a plain builder: it holds closures, so it is not serialized.

use frame_engine::{Element, IndexClass, SortKind};

use crate::aggregation::{AggregationType, Aggregator};

// ============================================================================
// FUNCTIONS
// ============================================================================

/// The aggregation applied to each group's data values.
#[derive(Debug, Clone, Default)]
pub enum PivotFunc {
    /// No aggregation; every group must hold exactly one row.
    #[default]
    None,
    Single(Aggregator),
    /// Labelled functions, one output column per data field and entry.
    Map(Vec<(Element, Aggregator)>),
}

/// Functions after normalisation: an empty map is no function, and a map of
/// one entry behaves as a single function.
#[derive(Debug, Clone)]
pub(crate) enum FuncMode {
    None,
    Single(Aggregator),
    Map(Vec<(Element, Aggregator)>),
}

impl FuncMode {
    /// Aggregators applied to each data field, in column order.
    pub(crate) fn aggregators(&self) -> Vec<&Aggregator> {
        match self {
            FuncMode::None => Vec::new(),
            FuncMode::Single(f) => vec![f],
            FuncMode::Map(entries) => entries.iter().map(|(_, f)| f).collect(),
        }
    }

    /// Labels of the function depth; empty unless several functions are mapped.
    pub(crate) fn func_fields(&self) -> Vec<Element> {
        match self {
            FuncMode::Map(entries) => {
                // repeated labels stay addressable by their occurrence number
                let mut seen: Vec<&Element> = Vec::with_capacity(entries.len());
                entries
                    .iter()
                    .map(|(label, _)| {
                        let repeats = seen.iter().filter(|l| **l == label).count();
                        seen.push(label);
                        if repeats == 0 {
                            label.clone()
                        } else {
                            Element::tuple([label.clone(), Element::Int(repeats as i64)])
                        }
                    })
                    .collect()
            }
            _ => Vec::new(),
        }
    }

    pub(crate) fn is_none(&self) -> bool {
        matches!(self, FuncMode::None)
    }

    /// Values produced per data field.
    pub(crate) fn width(&self) -> usize {
        match self {
            FuncMode::Map(entries) => entries.len(),
            _ => 1,
        }
    }
}

impl From<&PivotFunc> for FuncMode {
    fn from(func: &PivotFunc) -> Self {
        match func {
            PivotFunc::None => FuncMode::None,
            PivotFunc::Single(f) => FuncMode::Single(f.clone()),
            PivotFunc::Map(entries) => match entries.as_slice() {
                [] => FuncMode::None,
                [(_, f)] => FuncMode::Single(f.clone()),
                _ => FuncMode::Map(entries.clone()),
            },
        }
    }
}

// ============================================================================
// DEFINITION
// ============================================================================

/// Complete description of a pivot over one frame.
#[derive(Debug, Clone)]
pub struct PivotDefinition {
    /// Columns whose values become the row index.
    pub index_fields: Vec<Element>,

    /// Columns whose values become the column index.
    pub columns_fields: Vec<Element>,

    /// Columns whose values fill the cells. Empty means every column not
    /// used as an index or columns field.
    pub data_fields: Vec<Element>,

    pub func: PivotFunc,

    /// Value of cells with no source rows.
    pub fill_value: Element,

    /// Class of the row index; a hierarchical class is honoured when the
    /// row index has more than one depth.
    pub index_constructor: Option<IndexClass>,

    pub kind: SortKind,
}

impl Default for PivotDefinition {
    fn default() -> Self {
        PivotDefinition {
            index_fields: Vec::new(),
            columns_fields: Vec::new(),
            data_fields: Vec::new(),
            func: PivotFunc::None,
            fill_value: Element::nan(),
            index_constructor: None,
            kind: SortKind::default(),
        }
    }
}

fn labels<I, E>(fields: I) -> Vec<Element>
where
    I: IntoIterator<Item = E>,
    E: Into<Element>,
{
    fields.into_iter().map(Into::into).collect()
}

impl PivotDefinition {
    pub fn new<I, E>(index_fields: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<Element>,
    {
        PivotDefinition {
            index_fields: labels(index_fields),
            ..Default::default()
        }
    }

    pub fn columns<I, E>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<Element>,
    {
        self.columns_fields = labels(fields);
        self
    }

    pub fn data<I, E>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<Element>,
    {
        self.data_fields = labels(fields);
        self
    }

    pub fn func(mut self, func: impl Into<Aggregator>) -> Self {
        self.func = PivotFunc::Single(func.into());
        self
    }

    /// Map every data field through each built-in, labelled by its short name.
    pub fn funcs<I>(mut self, funcs: I) -> Self
    where
        I: IntoIterator<Item = AggregationType>,
    {
        self.func = PivotFunc::Map(
            funcs
                .into_iter()
                .map(|agg| (Element::str(agg.label()), Aggregator::Builtin(agg)))
                .collect(),
        );
        self
    }

    pub fn func_map(mut self, entries: Vec<(Element, Aggregator)>) -> Self {
        self.func = PivotFunc::Map(entries);
        self
    }

    pub fn fill_value(mut self, fill: impl Into<Element>) -> Self {
        self.fill_value = fill.into();
        self
    }

    pub fn index_constructor(mut self, class: IndexClass) -> Self {
        self.index_constructor = Some(class);
        self
    }

    pub fn kind(mut self, kind: SortKind) -> Self {
        self.kind = kind;
        self
    }
}
