use std::io::{BufRead, Write};

use anyhow::Result;
use log::warn;

use crate::data::loader::TableSource;
use crate::state::{Reply, Session};

// ---------------------------------------------------------------------------
// Interactive loop
// ---------------------------------------------------------------------------

pub struct PortesApp<S: TableSource> {
    pub session: Session<S>,
}

impl<S: TableSource> PortesApp<S> {
    pub fn new(session: Session<S>) -> Self {
        Self { session }
    }

    /// Read lines until an exit word or end of input. Errors raised while
    /// answering a line are printed and the loop goes on.
    pub fn run<R: BufRead, W: Write>(&mut self, input: R, output: &mut W) -> Result<()> {
        writeln!(output, "=== Consulta de Portes de Armas de Fogo (PORTES_2025) ===")?;
        writeln!(output, "Faça perguntas sobre os portes de armas de fogo emitidos em 2025.")?;
        writeln!(output, "Digite 'ajuda' para ver exemplos ou 'sair' para encerrar.\n")?;

        let mut lines = input.lines();
        loop {
            write!(output, "Você: ")?;
            output.flush()?;

            let Some(line) = lines.next() else {
                writeln!(output)?;
                break;
            };
            let line = line?;

            match self.session.handle_line(&line) {
                Ok(None) => continue,
                Ok(Some(Reply::Exit)) => {
                    writeln!(output, "Chatbot: Até mais!")?;
                    break;
                }
                Ok(Some(Reply::Text(text))) => writeln!(output, "Chatbot: {text}\n")?,
                Err(e) => {
                    warn!("line failed: {e:#}");
                    writeln!(output, "[ERRO] {e:#}\n")?;
                }
            }
        }

        Ok(())
    }
}
