use std::collections::BTreeMap;

use log::debug;
use serde::{Deserialize, Serialize};

use super::error::Result;
use super::filter::{PermitFilter, filtered_indices, lenient_i64};
use super::loader::{DatasetCache, TableSource};
use super::model::{CellValue, PermitTable, TOTAL_COLUMN};

/// Returned when no row survives the filters.
pub const NO_RECORDS_MESSAGE: &str = "Nenhum registro encontrado com esses filtros.";

/// Ranking size when the caller does not say.
pub const DEFAULT_TOP_N: i64 = 5;

fn default_top_n() -> Option<i64> {
    Some(DEFAULT_TOP_N)
}

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

/// Arguments of a `consultar_portes` call. Every field is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermitQuery {
    #[serde(flatten)]
    pub filter: PermitFilter,
    /// Column to rank by, e.g. `UF`, `MUNICIPIO`, `CALIBRE_ARMA`. Matched
    /// case-insensitively. Unset or empty means no ranking.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agrupar_por: Option<String>,
    /// Number of ranking lines. Unset means 5; `null`, zero or a negative
    /// value keep every group.
    #[serde(default = "default_top_n", deserialize_with = "lenient_i64")]
    pub top_n: Option<i64>,
}

impl Default for PermitQuery {
    fn default() -> Self {
        PermitQuery {
            filter: PermitFilter::default(),
            agrupar_por: None,
            top_n: default_top_n(),
        }
    }
}

impl PermitQuery {
    /// How many groups to render out of `available`.
    fn ranking_len(&self, available: usize) -> usize {
        match self.top_n {
            Some(n) if n > 0 => available.min(usize::try_from(n).unwrap_or(usize::MAX)),
            _ => available,
        }
    }
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// One ranking line: a distinct value of the grouping column and its total.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupTotal {
    pub key: CellValue,
    pub total: f64,
}

/// Sum `TOTAL` (or count rows when the table has no `TOTAL`) per distinct
/// key, largest first. Equal totals keep ascending key order. Rows with a
/// missing key are left out.
pub fn rank_groups(table: &PermitTable, column: &str, rows: &[usize]) -> Vec<GroupTotal> {
    let Some(keys) = table.column(column) else {
        return Vec::new();
    };
    let totals = table.column(TOTAL_COLUMN);

    let mut groups: BTreeMap<&CellValue, f64> = BTreeMap::new();
    for &row in rows {
        let key = &keys[row];
        if key.is_null() {
            continue;
        }
        let weight = match totals {
            Some(values) => values[row].as_f64().unwrap_or(0.0),
            None => 1.0,
        };
        *groups.entry(key).or_insert(0.0) += weight;
    }

    let mut ranking: Vec<GroupTotal> = groups
        .into_iter()
        .map(|(key, total)| GroupTotal {
            key: key.clone(),
            total,
        })
        .collect();
    ranking.sort_by(|a, b| b.total.total_cmp(&a.total));
    ranking
}

/// Sum of `TOTAL` over the rows, or the row count when there is no `TOTAL`.
pub fn grand_total(table: &PermitTable, rows: &[usize]) -> i64 {
    match table.column(TOTAL_COLUMN) {
        Some(values) => rows
            .iter()
            .map(|&row| values[row].as_f64().unwrap_or(0.0))
            .sum::<f64>() as i64,
        None => rows.len() as i64,
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Answer a query against the cached dataset, loading it on first use.
///
/// Only loading can fail. An empty selection or an unknown grouping column
/// produce an explanatory text, not an error.
pub fn consultar_portes<S: TableSource>(cache: &DatasetCache<S>, query: &PermitQuery) -> Result<String> {
    let table = cache.table()?;
    Ok(run_query(&table, query))
}

/// Filter, aggregate and render one query against a loaded table.
pub fn run_query(table: &PermitTable, query: &PermitQuery) -> String {
    let rows = filtered_indices(table, &query.filter);
    debug!("{} of {} rows selected", rows.len(), table.len());

    if rows.is_empty() {
        return NO_RECORDS_MESSAGE.to_string();
    }

    let summary = format!(
        "Foram encontrados {} portes de arma com os filtros informados.",
        grand_total(table, &rows)
    );

    let Some(requested) = query.agrupar_por.as_deref().filter(|c| !c.is_empty()) else {
        return format!("{summary}\n(Registros: {})", rows.len());
    };

    let column = requested.trim().to_uppercase();
    if !table.has_column(&column) {
        return format!(
            "A coluna '{requested}' não existe no dataset.\nColunas disponíveis: {}",
            table.column_names().join(", ")
        );
    }

    let mut ranking = rank_groups(table, &column, &rows);
    ranking.truncate(query.ranking_len(ranking.len()));

    let lines: Vec<String> = ranking
        .iter()
        .map(|g| format!("- {}: {} portes", g.key, g.total as i64))
        .collect();

    format!(
        "{summary}\nRanking por {column} (top {}):\n{}",
        ranking.len(),
        lines.join("\n")
    )
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::data::loader::{CsvOptions, read_csv};

    fn table(csv: &str) -> PermitTable {
        read_csv(csv.as_bytes(), &CsvOptions::default()).unwrap()
    }

    fn three_rows() -> PermitTable {
        table("UF;TOTAL\nBA;10\nBA;5\nSP;7\n")
    }

    fn by_uf(uf: &str) -> PermitQuery {
        PermitQuery {
            filter: PermitFilter {
                uf: Some(uf.into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn scalar_total_for_state() {
        assert_eq!(
            run_query(&three_rows(), &by_uf("BA")),
            "Foram encontrados 15 portes de arma com os filtros informados.\n(Registros: 2)"
        );
    }

    #[test]
    fn ranking_limited_to_top_one() {
        let query = PermitQuery {
            agrupar_por: Some("UF".into()),
            top_n: Some(1),
            ..Default::default()
        };
        assert_eq!(
            run_query(&three_rows(), &query),
            "Foram encontrados 22 portes de arma com os filtros informados.\n\
             Ranking por UF (top 1):\n\
             - BA: 15 portes"
        );
    }

    #[test]
    fn unknown_grouping_column_lists_available_columns() {
        let query = PermitQuery {
            agrupar_por: Some("NONEXISTENT".into()),
            ..Default::default()
        };
        assert_eq!(
            run_query(&three_rows(), &query),
            "A coluna 'NONEXISTENT' não existe no dataset.\nColunas disponíveis: UF, TOTAL"
        );
    }

    #[test]
    fn no_match_gives_fixed_message() {
        assert_eq!(run_query(&three_rows(), &by_uf("ZZ")), NO_RECORDS_MESSAGE);

        let query = PermitQuery {
            agrupar_por: Some("NONEXISTENT".into()),
            ..by_uf("ZZ")
        };
        assert_eq!(run_query(&three_rows(), &query), NO_RECORDS_MESSAGE);
    }

    #[test]
    fn grouping_column_is_case_insensitive() {
        let query = PermitQuery {
            agrupar_por: Some(" uf".into()),
            top_n: None,
            ..Default::default()
        };
        assert_eq!(
            run_query(&three_rows(), &query),
            "Foram encontrados 22 portes de arma com os filtros informados.\n\
             Ranking por UF (top 2):\n\
             - BA: 15 portes\n\
             - SP: 7 portes"
        );
    }

    fn many_states() -> PermitTable {
        table("UF;TOTAL\nAC;1\nAL;2\nAM;3\nBA;4\nCE;5\nDF;6\nES;7\nGO;8\n")
    }

    #[test]
    fn default_ranking_has_at_most_five_lines_descending() {
        let query = PermitQuery {
            agrupar_por: Some("UF".into()),
            ..Default::default()
        };
        let text = run_query(&many_states(), &query);
        let values: Vec<i64> = text
            .lines()
            .filter_map(|l| l.strip_prefix("- "))
            .map(|l| l.split(": ").nth(1).unwrap().trim_end_matches(" portes").parse().unwrap())
            .collect();

        assert_eq!(values, vec![8, 7, 6, 5, 4]);
        assert!(text.contains("Ranking por UF (top 5):"));
    }

    #[test]
    fn non_positive_top_n_keeps_every_group() {
        for top_n in [Some(0), Some(-3), None] {
            let query = PermitQuery {
                agrupar_por: Some("UF".into()),
                top_n,
                ..Default::default()
            };
            let text = run_query(&many_states(), &query);
            assert!(text.contains("(top 8)"), "{top_n:?}: {text}");
        }
    }

    #[test]
    fn ties_keep_key_order() {
        let t = table("UF;TOTAL\nSP;3\nBA;3\nRJ;3\nAC;1\n");
        let ranking = rank_groups(&t, "UF", &[0, 1, 2, 3]);
        let keys: Vec<String> = ranking.iter().map(|g| g.key.to_string()).collect();
        assert_eq!(keys, vec!["BA", "RJ", "SP", "AC"]);
    }

    #[test]
    fn rows_are_counted_without_total_column() {
        let t = table("UF;SEXO\nBA;M\nBA;F\nSP;M\n");
        let query = PermitQuery {
            agrupar_por: Some("SEXO".into()),
            ..Default::default()
        };
        assert_eq!(
            run_query(&t, &query),
            "Foram encontrados 3 portes de arma com os filtros informados.\n\
             Ranking por SEXO (top 2):\n\
             - M: 2 portes\n\
             - F: 1 portes"
        );
    }

    #[test]
    fn substring_filters_combine_with_year_and_month() {
        let t = table(
            "UF;CALIBRE_ARMA;ANO_EMISSAO;MES_MISSAO;TOTAL\n\
             BA;.380 ACP;2025;1;4\n\
             BA;9MM;2025;1;2\n\
             BA;.380 ACP;2025;2;8\n\
             SP;.380 ACP;2025;1;16\n",
        );
        let query = PermitQuery {
            filter: PermitFilter {
                uf: Some("ba".into()),
                calibre_arma: Some(".380".into()),
                ano_emissao: Some(2025),
                mes_missao: Some(1),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(
            run_query(&t, &query),
            "Foram encontrados 4 portes de arma com os filtros informados.\n(Registros: 1)"
        );
    }

    #[test]
    fn same_query_twice_gives_same_text() {
        let t = many_states();
        let query = PermitQuery {
            agrupar_por: Some("UF".into()),
            top_n: Some(3),
            ..Default::default()
        };
        assert_eq!(run_query(&t, &query), run_query(&t, &query));
    }

    #[test]
    fn json_arguments_deserialize_with_defaults() {
        let query: PermitQuery = serde_json::from_str(r#"{"uf": "BA", "ano_emissao": "2025"}"#).unwrap();
        assert_eq!(query.filter.uf.as_deref(), Some("BA"));
        assert_eq!(query.filter.ano_emissao, Some(2025));
        assert_eq!(query.top_n, Some(DEFAULT_TOP_N));

        let query: PermitQuery = serde_json::from_str(r#"{"agrupar_por": "UF", "top_n": null}"#).unwrap();
        assert_eq!(query.top_n, None);
    }

    #[test]
    fn cached_query_reads_file_once() {
        use std::io::Write;

        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(b"UF;TOTAL\nBA;10\nBA;5\nSP;7\n").unwrap();
        let cache = DatasetCache::open(file.path(), CsvOptions::default());

        let first = consultar_portes(&cache, &by_uf("BA")).unwrap();
        file.close().unwrap();
        let second = consultar_portes(&cache, &by_uf("BA")).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn missing_municipality_matches_nan_pattern() {
        let table = table("UF;MUNICIPIO;TOTAL\nBA;;10\nBA;SALVADOR;5\n");
        let query = PermitQuery {
            filter: PermitFilter {
                municipio: Some("NA".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(
            run_query(&table, &query),
            "Foram encontrados 10 portes de arma com os filtros informados.\n(Registros: 1)"
        );
    }
}
