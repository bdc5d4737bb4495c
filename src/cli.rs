//! Command-line interface.
//!
//! Every flag that points at the dataset also reads an environment variable.
//! `main` loads a `.env` file from the working directory first, so those
//! variables can live there.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::data::filter::PermitFilter;
use crate::data::loader::{CsvOptions, TextEncoding};
use crate::data::query::{DEFAULT_TOP_N, PermitQuery};

/// portes - consultas ao dataset PORTES_2025 de portes de armas de fogo
#[derive(Parser, Debug)]
#[command(name = "portes")]
#[command(author, version, about)]
#[command(after_help = "EXEMPLOS:\n  \
    # Modo interativo (padrão)\n  \
    portes --data PORTES_2025.csv\n\n  \
    # Consulta única\n  \
    portes consultar --uf BA --agrupar-por MUNICIPIO --top-n 10\n\n  \
    # Declaração da ferramenta para um agente\n  \
    portes esquema")]
pub struct Cli {
    /// Dataset file (.csv, .json or .parquet)
    #[arg(long, short = 'd', env = "PORTES_DATA", default_value = "PORTES_2025.csv", global = true)]
    pub data: PathBuf,

    /// Field separator of delimited text files
    #[arg(long, env = "PORTES_DELIMITER", default_value_t = ';', global = true)]
    pub delimiter: char,

    /// Character encoding of delimited text files
    #[arg(long, value_enum, env = "PORTES_ENCODING", default_value_t = EncodingArg::Latin1, global = true)]
    pub encoding: EncodingArg,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Interactive loop: one query per line (default)
    Chat,
    /// Run a single query and print the answer
    Consultar(QueryArgs),
    /// List the dataset columns
    Colunas,
    /// Print the tool declaration as JSON
    Esquema,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingArg {
    Latin1,
    Utf8,
}

impl From<EncodingArg> for TextEncoding {
    fn from(arg: EncodingArg) -> Self {
        match arg {
            EncodingArg::Latin1 => TextEncoding::Latin1,
            EncodingArg::Utf8 => TextEncoding::Utf8,
        }
    }
}

/// Filters and ranking options of `portes consultar`.
#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    /// State code, e.g. BA
    #[arg(long)]
    pub uf: Option<String>,
    /// Municipality, e.g. SALVADOR
    #[arg(long)]
    pub municipio: Option<String>,
    /// M or F
    #[arg(long)]
    pub sexo: Option<String>,
    /// Weapon type, e.g. Pistola
    #[arg(long)]
    pub especie_arma: Option<String>,
    /// Weapon brand
    #[arg(long)]
    pub marca_arma: Option<String>,
    /// Caliber, e.g. .380
    #[arg(long)]
    pub calibre_arma: Option<String>,
    /// Permit status
    #[arg(long)]
    pub status: Option<String>,
    /// Permit type
    #[arg(long)]
    pub tipo: Option<String>,
    /// Estadual or Nacional
    #[arg(long)]
    pub abrangencia: Option<String>,
    /// Issue year
    #[arg(long)]
    pub ano_emissao: Option<i64>,
    /// Issue month (1-12)
    #[arg(long)]
    pub mes_missao: Option<i64>,
    /// Column to rank by
    #[arg(long)]
    pub agrupar_por: Option<String>,
    /// Ranking size; zero or negative shows every group
    #[arg(long, default_value_t = DEFAULT_TOP_N, allow_negative_numbers = true)]
    pub top_n: i64,
}

impl From<QueryArgs> for PermitQuery {
    fn from(args: QueryArgs) -> Self {
        PermitQuery {
            filter: PermitFilter {
                uf: args.uf,
                municipio: args.municipio,
                sexo: args.sexo,
                especie_arma: args.especie_arma,
                marca_arma: args.marca_arma,
                calibre_arma: args.calibre_arma,
                status: args.status,
                tipo: args.tipo,
                abrangencia: args.abrangencia,
                ano_emissao: args.ano_emissao,
                mes_missao: args.mes_missao,
            },
            agrupar_por: args.agrupar_por,
            top_n: Some(args.top_n),
        }
    }
}

impl Cli {
    /// Reader options from the global flags. The delimiter must be one byte.
    pub fn csv_options(&self) -> anyhow::Result<CsvOptions> {
        if !self.delimiter.is_ascii() {
            anyhow::bail!("delimiter must be a single ASCII character, got '{}'", self.delimiter);
        }
        Ok(CsvOptions {
            delimiter: self.delimiter as u8,
            encoding: self.encoding.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn consultar_flags_become_a_query() {
        let cli = Cli::parse_from([
            "portes",
            "consultar",
            "--uf",
            "BA",
            "--agrupar-por",
            "MUNICIPIO",
            "--top-n",
            "-1",
        ]);
        let Some(Commands::Consultar(args)) = cli.command else {
            panic!("expected consultar");
        };
        let query = PermitQuery::from(args);
        assert_eq!(query.filter.uf.as_deref(), Some("BA"));
        assert_eq!(query.agrupar_por.as_deref(), Some("MUNICIPIO"));
        assert_eq!(query.top_n, Some(-1));
    }

    #[test]
    fn defaults_match_published_files() {
        let cli = Cli::parse_from(["portes", "--data", "x.csv"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.csv_options().unwrap(), CsvOptions::default());
    }

    #[test]
    fn non_ascii_delimiter_is_rejected() {
        let cli = Cli::parse_from(["portes", "--delimiter", "§"]);
        assert!(cli.csv_options().is_err());
    }
}
