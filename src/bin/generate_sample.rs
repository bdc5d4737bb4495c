//! Writes a synthetic PORTES dataset for trying the tool without the real
//! file: `sample_portes.csv` (semicolon separated, Latin-1) and
//! `sample_portes.parquet`.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn below(&mut self, n: usize) -> usize {
        (self.next_u64() % n as u64) as usize
    }

    /// Pick from weighted choices.
    fn pick<'a>(&mut self, choices: &[(&'a str, u32)]) -> &'a str {
        let sum: u32 = choices.iter().map(|(_, w)| w).sum();
        let mut roll = self.below(sum as usize) as u32;
        for &(value, weight) in choices {
            if roll < weight {
                return value;
            }
            roll -= weight;
        }
        choices[choices.len() - 1].0
    }
}

const CITIES: &[(&str, &str, u32)] = &[
    ("BA", "SALVADOR", 30),
    ("BA", "FEIRA DE SANTANA", 10),
    ("BA", "VITÓRIA DA CONQUISTA", 6),
    ("SP", "SÃO PAULO", 40),
    ("SP", "CAMPINAS", 12),
    ("RJ", "RIO DE JANEIRO", 25),
    ("MG", "BELO HORIZONTE", 18),
    ("PR", "CURITIBA", 14),
    ("GO", "GOIÂNIA", 11),
    ("DF", "BRASÍLIA", 16),
];

const WEAPONS: &[(&str, &str, &str, u32)] = &[
    ("Pistola", "TAURUS ARMAS S.A.", ".380 ACP", 35),
    ("Pistola", "TAURUS ARMAS S.A.", "9X19MM", 25),
    ("Pistola", "GLOCK", "9X19MM", 12),
    ("Revólver", "TAURUS ARMAS S.A.", ".38 SPL", 15),
    ("Pistola", "CBC", ".380 ACP", 8),
    ("Espingarda", "CBC", "12", 5),
];

const SEXES: &[(&str, u32)] = &[("M", 9), ("F", 1)];
const STATUSES: &[(&str, u32)] = &[("Ativo - Válido", 8), ("Cancelado", 1), ("Vencido", 1)];
const TYPES: &[(&str, u32)] = &[("Defesa Pessoal", 9), ("Funcional", 1)];
const SCOPES: &[(&str, u32)] = &[("Estadual", 7), ("Nacional", 3)];

const HEADER: [&str; 12] = [
    "UF",
    "MUNICIPIO",
    "SEXO",
    "ESPECIE_ARMA",
    "MARCA_ARMA",
    "CALIBRE_ARMA",
    "STATUS",
    "TIPO",
    "ABRANGENCIA",
    "ANO_EMISSAO",
    "MES_MISSAO",
    "TOTAL",
];

struct Row {
    text: [String; 9],
    month: i64,
    total: f64,
}

fn generate_rows(rng: &mut SimpleRng, count: usize) -> Vec<Row> {
    let city_weights: Vec<(&str, u32)> = CITIES.iter().map(|(_, c, w)| (*c, *w)).collect();
    let weapon_weights: Vec<(&str, u32)> = WEAPONS.iter().map(|(_, _, c, w)| (*c, *w)).collect();

    (0..count)
        .map(|_| {
            let city = rng.pick(&city_weights);
            let (uf, municipio, _) = CITIES.iter().find(|(_, c, _)| *c == city).copied().unwrap_or(CITIES[0]);
            let caliber = rng.pick(&weapon_weights);
            let candidates: Vec<_> = WEAPONS.iter().filter(|(_, _, c, _)| *c == caliber).collect();
            let (especie, marca, calibre, _) = *candidates[rng.below(candidates.len())];

            Row {
                text: [
                    uf.to_string(),
                    municipio.to_string(),
                    rng.pick(SEXES).to_string(),
                    especie.to_string(),
                    marca.to_string(),
                    calibre.to_string(),
                    rng.pick(STATUSES).to_string(),
                    rng.pick(TYPES).to_string(),
                    rng.pick(SCOPES).to_string(),
                ],
                month: rng.below(12) as i64 + 1,
                total: (rng.below(20) + 1) as f64,
            }
        })
        .collect()
}

/// ISO-8859-1 bytes; every generated string stays inside Latin-1.
fn latin1(s: &str) -> Result<Vec<u8>> {
    s.chars()
        .map(|c| u8::try_from(u32::from(c)).with_context(|| format!("'{c}' is not Latin-1")))
        .collect()
}

fn write_csv(path: &str, rows: &[Row]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .from_path(path)
        .with_context(|| format!("creating {path}"))?;

    writer.write_record(HEADER)?;
    for row in rows {
        let mut record: Vec<Vec<u8>> = row.text.iter().map(|s| latin1(s)).collect::<Result<_>>()?;
        record.push(b"2025".to_vec());
        record.push(row.month.to_string().into_bytes());
        record.push(format!("{}", row.total as i64).into_bytes());
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_parquet(path: &str, rows: &[Row]) -> Result<()> {
    let mut fields: Vec<Field> = HEADER[..9]
        .iter()
        .map(|name| Field::new(*name, DataType::Utf8, false))
        .collect();
    fields.push(Field::new("ANO_EMISSAO", DataType::Int64, false));
    fields.push(Field::new("MES_MISSAO", DataType::Int64, false));
    fields.push(Field::new("TOTAL", DataType::Float64, false));
    let schema = Arc::new(Schema::new(fields));

    let mut columns: Vec<Arc<dyn arrow::array::Array>> = (0..9)
        .map(|i| {
            Arc::new(StringArray::from(
                rows.iter().map(|r| r.text[i].as_str()).collect::<Vec<_>>(),
            )) as Arc<dyn arrow::array::Array>
        })
        .collect();
    columns.push(Arc::new(Int64Array::from(vec![2025_i64; rows.len()])));
    columns.push(Arc::new(Int64Array::from(rows.iter().map(|r| r.month).collect::<Vec<_>>())));
    columns.push(Arc::new(Float64Array::from(rows.iter().map(|r| r.total).collect::<Vec<_>>())));

    let batch = RecordBatch::try_new(schema.clone(), columns).context("building record batch")?;

    let file = std::fs::File::create(path).with_context(|| format!("creating {path}"))?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

fn main() -> Result<()> {
    let count: usize = match std::env::args().nth(1) {
        Some(arg) => arg.parse().with_context(|| format!("row count '{arg}' is not a number"))?,
        None => 2000,
    };
    if count == 0 {
        bail!("row count must be positive");
    }

    let mut rng = SimpleRng::new(42);
    let rows = generate_rows(&mut rng, count);

    write_csv("sample_portes.csv", &rows)?;
    write_parquet("sample_portes.parquet", &rows)?;

    let total: f64 = rows.iter().map(|r| r.total).sum();
    println!(
        "Wrote {count} rows ({} permits) to sample_portes.csv and sample_portes.parquet",
        total as i64
    );
    Ok(())
}
