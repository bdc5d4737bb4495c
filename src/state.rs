use anyhow::Result;
use log::debug;

use crate::data::loader::{DatasetCache, FileSource, TableSource};
use crate::data::query::{PermitQuery, consultar_portes};
use crate::tool::parse_tool_call;

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// Words that end the conversation (compared case-insensitively).
pub const EXIT_WORDS: &[&str] = &["sair", "exit", "quit"];

pub const HELP_TEXT: &str = "\
Cada linha é uma consulta ao dataset, escrita como pares chave=valor ou como objeto JSON.
Exemplos:
  uf=BA
  uf=BA agrupar_por=MUNICIPIO top_n=10
  calibre_arma=.380 status=\"Ativo - Válido\"
  {\"sexo\": \"F\", \"agrupar_por\": \"UF\"}
Argumentos: uf, municipio, sexo, especie_arma, marca_arma, calibre_arma, status, tipo,
abrangencia, ano_emissao, mes_missao, agrupar_por, top_n (top_n=null mostra todos).
Comandos: colunas, historico, ajuda, sair.";

/// What the loop should do with one line of input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Text to show the user.
    Text(String),
    /// End the loop.
    Exit,
}

/// The conversation state, independent of the terminal.
pub struct Session<S: TableSource = FileSource> {
    /// Dataset handle; loaded on the first query if not already.
    cache: DatasetCache<S>,

    /// Queries answered so far, oldest first.
    history: Vec<PermitQuery>,
}

impl<S: TableSource> Session<S> {
    pub fn new(cache: DatasetCache<S>) -> Self {
        Self {
            cache,
            history: Vec::new(),
        }
    }

    /// Handle one line. Blank lines give `None`.
    pub fn handle_line(&mut self, line: &str) -> Result<Option<Reply>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let lowered = line.to_lowercase();
        if EXIT_WORDS.contains(&lowered.as_str()) {
            return Ok(Some(Reply::Exit));
        }

        let reply = match lowered.as_str() {
            "ajuda" | "help" => HELP_TEXT.to_string(),
            "colunas" => self.columns()?,
            "historico" | "histórico" => self.history_text()?,
            _ => self.ask(parse_tool_call(line)?)?,
        };
        Ok(Some(Reply::Text(reply)))
    }

    /// Run a query against the dataset and remember it.
    pub fn ask(&mut self, query: PermitQuery) -> Result<String> {
        debug!("query #{}: {query:?}", self.history.len() + 1);
        let answer = consultar_portes(&self.cache, &query)?;
        self.history.push(query);
        Ok(answer)
    }

    /// Comma-separated column names of the dataset.
    pub fn columns(&self) -> Result<String> {
        let table = self.cache.table()?;
        Ok(format!("Colunas disponíveis: {}", table.column_names().join(", ")))
    }

    pub fn history(&self) -> &[PermitQuery] {
        &self.history
    }

    /// Past queries as numbered JSON argument lines, ready to paste back.
    fn history_text(&self) -> Result<String> {
        if self.history.is_empty() {
            return Ok("Nenhuma consulta feita ainda.".to_string());
        }
        let mut lines = Vec::with_capacity(self.history.len());
        for (i, query) in self.history.iter().enumerate() {
            lines.push(format!("{}. {}", i + 1, serde_json::to_string(query)?));
        }
        Ok(lines.join("\n"))
    }

    pub fn cache(&self) -> &DatasetCache<S> {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::data::error::{DataError, Result as DataResult};
    use crate::data::loader::{CsvOptions, read_csv};
    use crate::data::model::PermitTable;

    struct Inline(&'static str);

    impl TableSource for Inline {
        fn read_table(&self) -> DataResult<PermitTable> {
            read_csv(self.0.as_bytes(), &CsvOptions::default())
        }

        fn describe(&self) -> String {
            "inline".into()
        }
    }

    struct Missing;

    impl TableSource for Missing {
        fn read_table(&self) -> DataResult<PermitTable> {
            Err(DataError::NotFound("PORTES_2025.csv".into()))
        }

        fn describe(&self) -> String {
            "missing".into()
        }
    }

    fn session() -> Session<Inline> {
        Session::new(DatasetCache::new(Inline("UF;TOTAL\nBA;10\nBA;5\nSP;7\n")))
    }

    #[test]
    fn exit_words_end_the_session() {
        let mut s = session();
        for word in ["sair", "EXIT", " Quit "] {
            assert_eq!(s.handle_line(word).unwrap(), Some(Reply::Exit));
        }
    }

    #[test]
    fn blank_lines_are_skipped() {
        assert_eq!(session().handle_line("   ").unwrap(), None);
    }

    #[test]
    fn query_lines_are_answered_and_recorded() {
        let mut s = session();
        let reply = s.handle_line("uf=BA").unwrap();
        assert_eq!(
            reply,
            Some(Reply::Text(
                "Foram encontrados 15 portes de arma com os filtros informados.\n(Registros: 2)".into()
            ))
        );
        assert_eq!(s.history().len(), 1);
        assert!(s.cache().is_loaded());
    }

    #[test]
    fn columns_command_lists_columns() {
        assert_eq!(
            session().handle_line("colunas").unwrap(),
            Some(Reply::Text("Colunas disponíveis: UF, TOTAL".into()))
        );
    }

    #[test]
    fn history_replays_as_json_arguments() {
        let mut s = session();
        assert_eq!(
            s.handle_line("historico").unwrap(),
            Some(Reply::Text("Nenhuma consulta feita ainda.".into()))
        );

        s.handle_line("uf=SP top_n=2").unwrap();
        let Some(Reply::Text(text)) = s.handle_line("historico").unwrap() else {
            panic!("expected text");
        };
        let json = text.strip_prefix("1. ").unwrap();
        let replayed = parse_tool_call(json).unwrap();
        assert_eq!(&replayed, &s.history()[0]);
    }

    #[test]
    fn bad_arguments_are_errors_not_replies() {
        let mut s = session();
        assert!(s.handle_line("cidade=SALVADOR").is_err());
        assert!(s.history().is_empty());
    }

    #[test]
    fn load_failure_surfaces_as_error() {
        let mut s = Session::new(DatasetCache::new(Missing));
        let err = s.handle_line("uf=BA").unwrap_err();
        assert!(err.to_string().contains("file not found"));
    }
}
