use std::collections::HashMap;
use std::fmt;

// ---------------------------------------------------------------------------
// CellValue – a single cell of the permit table
// ---------------------------------------------------------------------------

/// A dynamically-typed cell value, inferred per column at load time.
/// Grouping keys go into a `BTreeMap`, so `CellValue` must be `Ord`.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
}

// -- Manual Eq/Ord so we can key a BTreeMap by CellValue --

impl Eq for CellValue {}

impl PartialOrd for CellValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CellValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use CellValue::*;
        fn discriminant(v: &CellValue) -> u8 {
            match v {
                Null => 0,
                Bool(_) => 1,
                Integer(_) => 2,
                Float(_) => 3,
                String(_) => 4,
            }
        }
        let da = discriminant(self);
        let db = discriminant(other);
        if da != db {
            return da.cmp(&db);
        }
        match (self, other) {
            (Null, Null) => std::cmp::Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (String(a), String(b)) => a.cmp(b),
            _ => std::cmp::Ordering::Equal,
        }
    }
}

impl std::hash::Hash for CellValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            CellValue::String(s) => s.hash(state),
            CellValue::Integer(i) => i.hash(state),
            CellValue::Float(f) => f.to_bits().hash(state),
            CellValue::Bool(b) => b.hash(state),
            CellValue::Null => {}
        }
    }
}

/// Text form used both for substring matching and for ranking keys.
/// Integral floats keep a trailing `.0` (`10.0`), missing cells print `nan`.
impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::String(s) => write!(f, "{s}"),
            CellValue::Integer(i) => write!(f, "{i}"),
            CellValue::Float(v) if v.is_finite() && v.fract() == 0.0 => write!(f, "{v:.1}"),
            CellValue::Float(v) => write!(f, "{v}"),
            CellValue::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            CellValue::Null => write!(f, "nan"),
        }
    }
}

impl CellValue {
    /// Numeric view of the value, used for `TOTAL` coercion and sums.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Float(v) => Some(*v),
            CellValue::Integer(i) => Some(*i as f64),
            CellValue::String(s) => s.trim().parse::<f64>().ok().filter(|v| !v.is_nan()),
            _ => None,
        }
    }

    /// Exact integer equality. Strings never compare equal to a number.
    pub fn equals_integer(&self, wanted: i64) -> bool {
        match self {
            CellValue::Integer(i) => *i == wanted,
            CellValue::Float(v) => *v == wanted as f64,
            _ => false,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }
}

// ---------------------------------------------------------------------------
// PermitTable – the complete loaded dataset
// ---------------------------------------------------------------------------

/// Name of the numeric count column.
pub const TOTAL_COLUMN: &str = "TOTAL";

/// The full parsed dataset, stored column by column.
///
/// Column names are unique, trimmed and upper-cased; the loader guarantees it
/// through [`normalize_column_names`]. Once built the table is never mutated.
#[derive(Debug, Clone, Default)]
pub struct PermitTable {
    column_names: Vec<String>,
    columns: Vec<Vec<CellValue>>,
    index: HashMap<String, usize>,
    row_count: usize,
}

impl PermitTable {
    /// Build a table from named columns. Every column must have the same length.
    pub fn from_columns(columns: Vec<(String, Vec<CellValue>)>) -> Self {
        let row_count = columns.first().map_or(0, |(_, values)| values.len());
        debug_assert!(columns.iter().all(|(_, v)| v.len() == row_count));

        let mut column_names = Vec::with_capacity(columns.len());
        let mut data = Vec::with_capacity(columns.len());
        let mut index = HashMap::with_capacity(columns.len());
        for (i, (name, values)) in columns.into_iter().enumerate() {
            index.insert(name.clone(), i);
            column_names.push(name);
            data.push(values);
        }

        PermitTable {
            column_names,
            columns: data,
            index,
            row_count,
        }
    }

    /// Ordered list of column names.
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Values of a column, looked up by its normalized (upper-case) name.
    pub fn column(&self, name: &str) -> Option<&[CellValue]> {
        self.index.get(name).map(|&i| self.columns[i].as_slice())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.row_count
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }
}

/// Trim and upper-case header names. Names that collide after normalization
/// get a `.1`, `.2`, ... suffix so the result stays unique.
pub fn normalize_column_names<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut names = Vec::new();
    for name in raw {
        let base = name.as_ref().trim().to_uppercase();
        let mut candidate = base.clone();
        while seen.contains_key(&candidate) {
            let n = seen.entry(base.clone()).or_insert(0);
            *n += 1;
            candidate = format!("{base}.{n}");
        }
        seen.insert(candidate.clone(), 0);
        names.push(candidate);
    }
    names
}
