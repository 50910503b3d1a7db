//! Flat-file matrix exchange and object persistence.
//!
//! [`file_data_store`] / [`file_data_read`] move dense matrices through a
//! delimited text format readable by spreadsheets and plotting tools:
//!
//! ```text
//! # Generated by stochastic-taylor: 2x2 complex matrix in decimal format [',' separated values].
//! 1.0000000000+0.0000000000j,0.0000000000-0.5000000000j
//! 0.0000000000+0.5000000000j,1.0000000000+0.0000000000j
//! ```
//!
//! [`qsave`] / [`qload`] persist any `serde` value as JSON in `<name>.qu`.

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::info;
use nalgebra::DMatrix;
use num_complex::Complex64;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Whether entries are written with their imaginary parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumType {
    Complex,
    Real,
}

/// Fixed-point (`%.10f`) or scientific (`%.10e`) notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumFormat {
    Decimal,
    Exp,
}

impl FromStr for NumType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "complex" => Ok(NumType::Complex),
            "real" => Ok(NumType::Real),
            other => Err(Error::UnknownFormat { kind: "numtype", tag: other.to_string() }),
        }
    }
}

impl FromStr for NumFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "decimal" => Ok(NumFormat::Decimal),
            "exp" => Ok(NumFormat::Exp),
            other => Err(Error::UnknownFormat { kind: "numformat", tag: other.to_string() }),
        }
    }
}

impl fmt::Display for NumType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NumType::Complex => "complex",
            NumType::Real => "real",
        })
    }
}

impl fmt::Display for NumFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NumFormat::Decimal => "decimal",
            NumFormat::Exp => "exp",
        })
    }
}

/// A matrix read from a data file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataMatrix {
    Real(DMatrix<f64>),
    Complex(DMatrix<Complex64>),
}

impl DataMatrix {
    pub fn shape(&self) -> (usize, usize) {
        match self {
            DataMatrix::Real(m) => m.shape(),
            DataMatrix::Complex(m) => m.shape(),
        }
    }

    pub fn is_complex(&self) -> bool {
        matches!(self, DataMatrix::Complex(_))
    }

    /// Entry `(row, col)` as a complex number.
    pub fn get(&self, row: usize, col: usize) -> Option<Complex64> {
        match self {
            DataMatrix::Real(m) => m.get((row, col)).map(|&re| Complex64::new(re, 0.0)),
            DataMatrix::Complex(m) => m.get((row, col)).copied(),
        }
    }

    pub fn into_complex(self) -> DMatrix<Complex64> {
        match self {
            DataMatrix::Real(m) => m.map(|re| Complex64::new(re, 0.0)),
            DataMatrix::Complex(m) => m,
        }
    }
}

impl From<DMatrix<f64>> for DataMatrix {
    fn from(m: DMatrix<f64>) -> Self {
        DataMatrix::Real(m)
    }
}

impl From<DMatrix<Complex64>> for DataMatrix {
    fn from(m: DMatrix<Complex64>) -> Self {
        DataMatrix::Complex(m)
    }
}

/// `%.{precision}e` with a signed exponent of at least two digits
/// (`1.5000000000e-03`).
pub fn format_exp(x: f64, precision: usize) -> String {
    let s = format!("{x:.precision$e}");
    match s.split_once('e').map(|(mantissa, exp)| (mantissa, exp.parse::<i32>())) {
        Some((mantissa, Ok(exp))) => {
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{mantissa}e{sign}{:02}", exp.unsigned_abs())
        }
        _ => s,
    }
}

fn format_real(x: f64, format: NumFormat) -> String {
    match format {
        NumFormat::Decimal => format!("{x:.10}"),
        NumFormat::Exp => format_exp(x, 10),
    }
}

fn format_complex(z: Complex64, format: NumFormat) -> String {
    let sign = if z.im.is_sign_negative() { "" } else { "+" };
    format!("{}{sign}{}j", format_real(z.re, format), format_real(z.im, format))
}

/// Write `data` to `path` as delimited text, one matrix row per line.
///
/// With [`NumType::Real`] only real parts are written.
pub fn file_data_store<P: AsRef<Path>>(
    path: P,
    data: &DataMatrix,
    numtype: NumType,
    numformat: NumFormat,
    sep: char,
) -> Result<()> {
    let data = data.clone().into_complex();
    let (rows, cols) = data.shape();
    let mut writer = BufWriter::new(File::create(path)?);

    writeln!(
        writer,
        "# Generated by stochastic-taylor: {rows}x{cols} {numtype} matrix in {numformat} format \
         ['{sep}' separated values]."
    )?;

    for row in data.row_iter() {
        let fields: Vec<String> = row
            .iter()
            .map(|&z| match numtype {
                NumType::Complex => format_complex(z, numformat),
                NumType::Real => format_real(z.re, numformat),
            })
            .collect();
        writeln!(writer, "{}", fields.join(&sep.to_string()))?;
    }
    writer.flush()?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delimiter {
    Char(char),
    Whitespace,
}

impl Delimiter {
    const CANDIDATES: [char; 4] = [',', ';', ':', '|'];

    fn detect(line: &str) -> Result<Self> {
        if let Some(&c) = Self::CANDIDATES.iter().find(|&&c| line.contains(c)) {
            return Ok(Delimiter::Char(c));
        }
        if line.split_whitespace().count() > 1 {
            return Ok(Delimiter::Whitespace);
        }
        Err(Error::UnrecognizedDelimiter(line.to_string()))
    }

    fn from_sep(sep: char) -> Self {
        if sep.is_whitespace() {
            Delimiter::Whitespace
        } else {
            Delimiter::Char(sep)
        }
    }

    fn split(self, line: &str) -> Vec<String> {
        match self {
            Delimiter::Char(c) => line.split(c).map(|field| field.trim().to_string()).collect(),
            Delimiter::Whitespace => line.split_whitespace().map(str::to_string).collect(),
        }
    }
}

/// Parse `a+bj`, `a-bj`, `bj` or `a` (a trailing `i` is also accepted).
pub fn parse_complex(s: &str) -> Result<Complex64> {
    let err = || Error::ParseNumber(s.to_string());
    let t = s.trim();
    let Some(body) = t.strip_suffix(|c: char| c == 'j' || c == 'i') else {
        return t.parse::<f64>().map(|re| Complex64::new(re, 0.0)).map_err(|_| err());
    };

    // last sign that is neither leading nor part of an exponent
    let bytes = body.as_bytes();
    let split = (1..bytes.len())
        .rev()
        .find(|&k| matches!(bytes[k], b'+' | b'-') && !matches!(bytes[k - 1], b'e' | b'E'));

    let parse_im = |im: &str| -> Result<f64> {
        match im {
            "" | "+" => Ok(1.0),
            "-" => Ok(-1.0),
            _ => im.parse::<f64>().map_err(|_| err()),
        }
    };

    match split {
        Some(k) => {
            let re = body[..k].parse::<f64>().map_err(|_| err())?;
            Ok(Complex64::new(re, parse_im(&body[k..])?))
        }
        None => Ok(Complex64::new(0.0, parse_im(body)?)),
    }
}

fn looks_complex(entry: &str) -> bool {
    entry.contains('j') || entry.ends_with('i')
}

/// Read a matrix written by [`file_data_store`] or any similar tool.
///
/// Lines starting with `#` or `%` and blank lines are skipped. Without an
/// explicit `sep` the delimiter is detected from the first data line; the
/// entry type (real or complex) is detected from its first entry.
pub fn file_data_read<P: AsRef<Path>>(path: P, sep: Option<char>) -> Result<DataMatrix> {
    let reader = BufReader::new(File::open(path)?);

    let mut delimiter = sep.map(Delimiter::from_sep);
    let mut rows: Vec<Vec<String>> = Vec::new();

    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('%') {
            continue;
        }
        let delim = match delimiter {
            Some(d) => d,
            None => *delimiter.insert(Delimiter::detect(line)?),
        };
        let fields = delim.split(line);
        if let Some(first) = rows.first() {
            if fields.len() != first.len() {
                return Err(Error::RaggedRow {
                    row: rows.len(),
                    expected: first.len(),
                    found: fields.len(),
                });
            }
        }
        rows.push(fields);
    }

    let Some(first) = rows.first() else {
        return Err(Error::EmptyData);
    };
    let (m, n) = (rows.len(), first.len());
    let complex = looks_complex(&first[0]);
    let entries = rows.iter().flatten();

    if complex {
        let values = entries.map(|s| parse_complex(s)).collect::<Result<Vec<_>>>()?;
        Ok(DataMatrix::Complex(DMatrix::from_row_slice(m, n, &values)))
    } else {
        let values = entries
            .map(|s| s.parse::<f64>().map_err(|_| Error::ParseNumber(s.clone())))
            .collect::<Result<Vec<_>>>()?;
        Ok(DataMatrix::Real(DMatrix::from_row_slice(m, n, &values)))
    }
}

fn qu_path(name: &Path) -> PathBuf {
    let mut path = name.as_os_str().to_owned();
    path.push(".qu");
    PathBuf::from(path)
}

/// Serialize `data` to `<name>.qu`. Returns the written path.
pub fn qsave<T: Serialize + ?Sized, P: AsRef<Path>>(data: &T, name: P) -> Result<PathBuf> {
    let path = qu_path(name.as_ref());
    let mut writer = BufWriter::new(File::create(&path)?);
    serde_json::to_writer(&mut writer, data)?;
    writer.flush()?;
    Ok(path)
}

/// Load a value stored by [`qsave`] from `<name>.qu`.
pub fn qload<T: DeserializeOwned, P: AsRef<Path>>(name: P) -> Result<T> {
    let path = qu_path(name.as_ref());
    let reader = BufReader::new(File::open(&path)?);
    let value = serde_json::from_reader(reader)?;
    info!("loaded {} object from {}", std::any::type_name::<T>(), path.display());
    Ok(value)
}
