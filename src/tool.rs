use anyhow::{Context, Result, bail};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue, json};

use crate::data::query::{DEFAULT_TOP_N, PermitQuery};

// ---------------------------------------------------------------------------
// Tool declaration
// ---------------------------------------------------------------------------

pub const TOOL_NAME: &str = "consultar_portes";

const TOOL_DESCRIPTION: &str = "Consulta o arquivo PORTES_2025 (portes de armas de fogo - \
defesa pessoal) com filtros opcionais e devolve um resumo em texto com o total de portes \
e, se solicitado, um ranking agregado pela coluna escolhida.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParamKind {
    Text,
    Integer,
}

/// Argument name, kind and description, in declaration order.
const PARAMETERS: &[(&str, ParamKind, &str)] = &[
    ("uf", ParamKind::Text, "sigla do estado (ex.: \"BA\")"),
    ("municipio", ParamKind::Text, "nome do município (ex.: \"SALVADOR\")"),
    ("sexo", ParamKind::Text, "\"M\" ou \"F\""),
    ("especie_arma", ParamKind::Text, "ex.: \"Pistola\""),
    ("marca_arma", ParamKind::Text, "ex.: \"TAURUS ARMAS S.A.\""),
    ("calibre_arma", ParamKind::Text, "ex.: \".380 ACP\""),
    ("status", ParamKind::Text, "ex.: \"Ativo - Válido\", \"Cancelado\", \"Vencido\""),
    ("tipo", ParamKind::Text, "ex.: \"Defesa Pessoal\", \"Funcional\""),
    ("abrangencia", ParamKind::Text, "ex.: \"Estadual\", \"Nacional\""),
    ("ano_emissao", ParamKind::Integer, "ano numérico (ex.: 2025)"),
    ("mes_missao", ParamKind::Integer, "mês numérico (1 a 12)"),
    (
        "agrupar_por",
        ParamKind::Text,
        "nome de uma coluna para gerar ranking (ex.: \"UF\", \"MUNICIPIO\", \"CALIBRE_ARMA\", \"MARCA_ARMA\")",
    ),
    ("top_n", ParamKind::Integer, "quantidade de linhas no ranking (padrão = 5)"),
];

fn param_kind(name: &str) -> Option<ParamKind> {
    let name = if name == "mes_emissao" { "mes_missao" } else { name };
    PARAMETERS
        .iter()
        .find(|(param, _, _)| *param == name)
        .map(|(_, kind, _)| *kind)
}

/// Function declaration an agent registers to call the query engine.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDeclaration {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: JsonValue,
}

pub fn tool_declaration() -> ToolDeclaration {
    let properties: Map<String, JsonValue> = PARAMETERS
        .iter()
        .map(|(name, kind, description)| {
            let schema = match kind {
                ParamKind::Text => json!({ "type": "string", "description": description }),
                ParamKind::Integer => json!({ "type": "integer", "description": description }),
            };
            (name.to_string(), schema)
        })
        .collect();

    let mut parameters = json!({ "type": "object", "properties": properties });
    parameters["properties"]["top_n"]["default"] = json!(DEFAULT_TOP_N);

    ToolDeclaration {
        name: TOOL_NAME,
        description: TOOL_DESCRIPTION,
        parameters,
    }
}

// ---------------------------------------------------------------------------
// Argument parsing
// ---------------------------------------------------------------------------

/// Parse one tool call written either as a JSON object
/// (`{"uf": "BA", "top_n": 3}`) or as `chave=valor` pairs
/// (`uf=BA agrupar_por=MUNICIPIO status="Ativo - Válido"`).
pub fn parse_tool_call(line: &str) -> Result<PermitQuery> {
    let line = line.trim();
    let args = if line.starts_with('{') {
        let value: JsonValue = serde_json::from_str(line).context("invalid JSON arguments")?;
        match value {
            JsonValue::Object(map) => map,
            _ => bail!("expected a JSON object of arguments"),
        }
    } else {
        parse_pairs(line)?
    };

    for key in args.keys() {
        if param_kind(key).is_none() {
            bail!(
                "unknown argument '{key}' (expected one of: {})",
                PARAMETERS.iter().map(|(name, _, _)| *name).collect::<Vec<_>>().join(", ")
            );
        }
    }

    serde_json::from_value(JsonValue::Object(args)).context("invalid argument value")
}

fn parse_pairs(line: &str) -> Result<Map<String, JsonValue>> {
    let mut args = Map::new();
    for token in split_tokens(line)? {
        let Some((key, value)) = token.split_once('=') else {
            bail!("expected chave=valor, got '{token}'");
        };
        let key = key.trim().to_lowercase();
        let value = match param_kind(&key) {
            Some(ParamKind::Integer) if value.eq_ignore_ascii_case("null") => JsonValue::Null,
            Some(ParamKind::Integer) => {
                let n: i64 = value
                    .trim()
                    .parse()
                    .with_context(|| format!("'{key}' expects an integer, got '{value}'"))?;
                JsonValue::from(n)
            }
            _ => JsonValue::String(value.to_string()),
        };
        args.insert(key, value);
    }
    Ok(args)
}

/// Split on whitespace, keeping double-quoted runs together and dropping
/// the quotes.
fn split_tokens(line: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut started = false;

    for ch in line.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                started = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if started {
                    tokens.push(std::mem::take(&mut current));
                    started = false;
                }
            }
            c => {
                current.push(c);
                started = true;
            }
        }
    }
    if in_quotes {
        bail!("unterminated quote");
    }
    if started {
        tokens.push(current);
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn pairs_with_quoted_values() {
        let query = parse_tool_call(r#"uf=BA status="Ativo - Válido" ano_emissao=2025 top_n=3"#).unwrap();
        assert_eq!(query.filter.uf.as_deref(), Some("BA"));
        assert_eq!(query.filter.status.as_deref(), Some("Ativo - Válido"));
        assert_eq!(query.filter.ano_emissao, Some(2025));
        assert_eq!(query.top_n, Some(3));
    }

    #[test]
    fn json_object_arguments() {
        let query = parse_tool_call(r#"{"agrupar_por": "MUNICIPIO", "top_n": null}"#).unwrap();
        assert_eq!(query.agrupar_por.as_deref(), Some("MUNICIPIO"));
        assert_eq!(query.top_n, None);
    }

    #[test]
    fn empty_line_is_an_unfiltered_query() {
        assert_eq!(parse_tool_call("").unwrap(), PermitQuery::default());
    }

    #[test]
    fn null_top_n_in_pairs() {
        assert_eq!(parse_tool_call("agrupar_por=UF top_n=null").unwrap().top_n, None);
    }

    #[test]
    fn keys_are_case_insensitive_in_pairs() {
        let query = parse_tool_call("UF=sp").unwrap();
        assert_eq!(query.filter.uf.as_deref(), Some("sp"));
    }

    #[test]
    fn unknown_argument_is_rejected() {
        let err = parse_tool_call("cidade=SALVADOR").unwrap_err();
        assert!(err.to_string().contains("unknown argument 'cidade'"));

        assert!(parse_tool_call(r#"{"cidade": "SALVADOR"}"#).is_err());
    }

    #[test]
    fn malformed_input_is_rejected() {
        assert!(parse_tool_call("ano_emissao=dois mil").is_err());
        assert!(parse_tool_call("uf").is_err());
        assert!(parse_tool_call(r#"municipio="SAO PAULO"#).is_err());
        assert!(parse_tool_call("[1, 2]").is_err());
    }

    #[test]
    fn declaration_lists_every_argument() {
        let decl = tool_declaration();
        assert_eq!(decl.name, "consultar_portes");

        let properties = decl.parameters["properties"].as_object().unwrap();
        assert_eq!(properties.len(), PARAMETERS.len());
        assert_eq!(properties["ano_emissao"]["type"], "integer");
        assert_eq!(properties["top_n"]["default"], 5);
    }
}
