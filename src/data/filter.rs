use log::debug;
use serde::{Deserialize, Deserializer, Serialize};

use super::model::{CellValue, PermitTable};

// ---------------------------------------------------------------------------
// Filter criteria
// ---------------------------------------------------------------------------

/// A single row predicate against one named column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Criterion {
    /// Case-insensitive substring match on the cell's text form.
    Contains { column: &'static str, pattern: String },
    /// Exact integer equality.
    Equals { column: &'static str, value: i64 },
}

impl Criterion {
    pub fn column(&self) -> &'static str {
        match self {
            Criterion::Contains { column, .. } | Criterion::Equals { column, .. } => *column,
        }
    }

    fn matches(&self, cell: &CellValue) -> bool {
        match self {
            Criterion::Contains { pattern, .. } => cell.to_string().to_uppercase().contains(pattern.as_str()),
            Criterion::Equals { value, .. } => cell.equals_integer(*value),
        }
    }
}

/// The optional filters of a permit query. Unset fields do not constrain.
///
/// Text fields match as case-insensitive substrings, so `calibre_arma: ".380"`
/// also selects `.380 ACP`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermitFilter {
    /// State code, e.g. `BA`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uf: Option<String>,
    /// Municipality name, e.g. `SALVADOR`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub municipio: Option<String>,
    /// Holder sex, `M` or `F`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sexo: Option<String>,
    /// Weapon type, e.g. `Pistola`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub especie_arma: Option<String>,
    /// Weapon brand, e.g. `TAURUS ARMAS S.A.`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marca_arma: Option<String>,
    /// Caliber, e.g. `.380 ACP`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calibre_arma: Option<String>,
    /// Permit status, e.g. `Ativo - Válido`, `Cancelado`, `Vencido`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Permit type, e.g. `Defesa Pessoal`, `Funcional`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tipo: Option<String>,
    /// Jurisdiction, `Estadual` or `Nacional`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abrangencia: Option<String>,
    /// Issue year, exact match.
    #[serde(deserialize_with = "lenient_i64", skip_serializing_if = "Option::is_none")]
    pub ano_emissao: Option<i64>,
    /// Issue month (1 to 12), exact match. The column name keeps the
    /// dataset's spelling; `mes_emissao` is accepted too.
    #[serde(alias = "mes_emissao", deserialize_with = "lenient_i64", skip_serializing_if = "Option::is_none")]
    pub mes_missao: Option<i64>,
}

/// Accept `2025`, `2025.0` or `"2025"` for integer arguments; agents are not
/// consistent about quoting numbers.
pub(crate) fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Float(f64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Int(i)) => Ok(Some(i)),
        Some(Raw::Float(f)) if is_i64_float(f) => Ok(Some(f as i64)),
        Some(Raw::Float(f)) => Err(serde::de::Error::custom(format!("expected an integer, got {f}"))),
        Some(Raw::Text(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("expected an integer, got {s:?}"))),
    }
}

/// Integral and inside the `i64` range; `as` would saturate otherwise.
fn is_i64_float(f: f64) -> bool {
    f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64
}

impl PermitFilter {
    /// The active predicates. Empty text patterns count as unset.
    pub fn criteria(&self) -> Vec<Criterion> {
        let text = [
            ("UF", &self.uf),
            ("MUNICIPIO", &self.municipio),
            ("SEXO", &self.sexo),
            ("ESPECIE_ARMA", &self.especie_arma),
            ("MARCA_ARMA", &self.marca_arma),
            ("CALIBRE_ARMA", &self.calibre_arma),
            ("STATUS", &self.status),
            ("TIPO", &self.tipo),
            ("ABRANGENCIA", &self.abrangencia),
        ];
        let numeric = [("ANO_EMISSAO", self.ano_emissao), ("MES_MISSAO", self.mes_missao)];

        let mut criteria: Vec<Criterion> = text
            .into_iter()
            .filter_map(|(column, value)| match value.as_deref() {
                Some(v) if !v.is_empty() => Some(Criterion::Contains {
                    column,
                    pattern: v.to_uppercase(),
                }),
                _ => None,
            })
            .collect();
        criteria.extend(
            numeric
                .into_iter()
                .filter_map(|(column, value)| value.map(|value| Criterion::Equals { column, value })),
        );
        criteria
    }
}

// ---------------------------------------------------------------------------
// Row selection
// ---------------------------------------------------------------------------

/// Return indices of rows that pass every criterion.
///
/// A criterion whose column does not exist in the table is skipped; it
/// neither filters rows nor raises an error.
pub fn filtered_indices(table: &PermitTable, filter: &PermitFilter) -> Vec<usize> {
    let mut selected: Vec<usize> = (0..table.len()).collect();

    for criterion in filter.criteria() {
        let Some(values) = table.column(criterion.column()) else {
            debug!("column {} not in dataset, ignoring filter", criterion.column());
            continue;
        };
        selected.retain(|&row| criterion.matches(&values[row]));
        debug!("{criterion:?} -> {} rows", selected.len());
    }

    selected
}
