//! CCSD amplitudes from a Psi4 output transcript.
//!
//! Psi4's `ccenergy` module prints the largest amplitudes in up to five
//! tables, each introduced by a header line and terminated by a blank line:
//!
//! ```text
//!                 Largest TIA Amplitudes:
//!               0   0         0.0012345678
//!
//!                 Largest TIjAb Amplitudes:
//!       0   0   0   0        -0.0683821371
//! ```
//!
//! Singles rows are `i a value`, doubles rows `i j a b value`, with occupied
//! indices counted from the first orbital and virtual indices counted from
//! the first virtual orbital of the same spin. A transcript without any
//! lower-case (beta) table comes from a restricted reference; its alpha
//! amplitudes are mirrored into the beta slots.
//!
//! The tables are mapped into spin-orbital tensors where spin-orbital
//! `2p` is spatial orbital `p` with alpha spin and `2p + 1` the same orbital
//! with beta spin. Doubles carry the conventional factor 1/2.

use log::debug;
use ndarray::{Array2, Array4};
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Errors raised while reading amplitudes.
#[derive(Error, Debug)]
pub enum AmplitudeError {
    /// Transcript unreadable
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Row that is short or holds a non-numeric token
    #[error("Malformed amplitude row on line {line}: {message}")]
    Format {
        /// 1-based line number in the transcript
        line: usize,
        /// What was wrong
        message: String,
    },
    /// Amplitude index that maps outside the spin-orbital space
    #[error("Amplitude index {index:?} is outside {n_spin_orbitals} spin orbitals (line {line})")]
    IndexOutOfRange {
        /// Spin-orbital index tuple, or the row's own indices when the
        /// mapping overflows
        index: Vec<usize>,
        /// Tensor dimension
        n_spin_orbitals: usize,
        /// 1-based line number in the transcript
        line: usize,
    },
}

type Result<T> = std::result::Result<T, AmplitudeError>;

/// The amplitude tables Psi4 prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmplitudeSection {
    /// Alpha singles, `TIA`
    SinglesAlpha,
    /// Beta singles, `Tia`
    SinglesBeta,
    /// Alpha-alpha doubles, `TIJAB`
    DoublesAlpha,
    /// Beta-beta doubles, `Tijab`
    DoublesBeta,
    /// Alpha-beta doubles, `TIjAb`
    DoublesMixed,
}

const SECTION_HEADERS: [(AmplitudeSection, &str); 5] = [
    (AmplitudeSection::SinglesAlpha, "Largest TIA Amplitudes:"),
    (AmplitudeSection::SinglesBeta, "Largest Tia Amplitudes:"),
    (AmplitudeSection::DoublesAlpha, "Largest TIJAB Amplitudes:"),
    (AmplitudeSection::DoublesBeta, "Largest Tijab Amplitudes:"),
    (AmplitudeSection::DoublesMixed, "Largest TIjAb Amplitudes:"),
];

impl AmplitudeSection {
    /// Header line introducing the table.
    pub fn header(self) -> &'static str {
        SECTION_HEADERS
            .iter()
            .find(|(section, _)| *section == self)
            .map(|(_, header)| *header)
            .unwrap_or_default()
    }

    /// Section whose header occurs in `line`, if any.
    pub fn detect(line: &str) -> Option<Self> {
        SECTION_HEADERS
            .iter()
            .find(|(_, header)| line.contains(header))
            .map(|(section, _)| *section)
    }

    fn is_singles(self) -> bool {
        matches!(self, AmplitudeSection::SinglesAlpha | AmplitudeSection::SinglesBeta)
    }
}

/// Singles row `i a value`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SingleAmplitude {
    /// Occupied orbital
    pub i: usize,
    /// Virtual orbital
    pub a: usize,
    /// Amplitude
    pub value: f64,
    /// Line the row came from
    pub line: usize,
}

/// Doubles row `i j a b value`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DoubleAmplitude {
    /// First occupied orbital
    pub i: usize,
    /// Second occupied orbital
    pub j: usize,
    /// First virtual orbital
    pub a: usize,
    /// Second virtual orbital
    pub b: usize,
    /// Amplitude
    pub value: f64,
    /// Line the row came from
    pub line: usize,
}

/// All amplitude tables found in one transcript.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AmplitudeTables {
    /// `TIA` rows
    pub singles_alpha: Vec<SingleAmplitude>,
    /// `Tia` rows
    pub singles_beta: Vec<SingleAmplitude>,
    /// `TIJAB` rows
    pub doubles_alpha: Vec<DoubleAmplitude>,
    /// `Tijab` rows
    pub doubles_beta: Vec<DoubleAmplitude>,
    /// `TIjAb` rows
    pub doubles_mixed: Vec<DoubleAmplitude>,
    /// No beta table header was present
    pub restricted: bool,
}

fn parse_index(token: &str, line: usize) -> Result<usize> {
    token.parse().map_err(|_| AmplitudeError::Format {
        line,
        message: format!("expected an orbital index, found '{}'", token),
    })
}

fn parse_value(token: &str, line: usize) -> Result<f64> {
    token.parse().map_err(|_| AmplitudeError::Format {
        line,
        message: format!("expected an amplitude, found '{}'", token),
    })
}

fn require_columns(tokens: &[&str], count: usize, line: usize) -> Result<()> {
    if tokens.len() < count {
        return Err(AmplitudeError::Format {
            line,
            message: format!("expected {} columns, found {}", count, tokens.len()),
        });
    }
    Ok(())
}

/// Finds and reads every amplitude table in `lines`.
///
/// When a header occurs more than once the last occurrence is used. Rows are
/// read from the line after the header up to the first blank line.
pub fn scan_amplitude_tables<S: AsRef<str>>(lines: &[S]) -> Result<AmplitudeTables> {
    let mut starts: Vec<(AmplitudeSection, usize)> = Vec::new();
    for (index, line) in lines.iter().enumerate() {
        if let Some(section) = AmplitudeSection::detect(line.as_ref()) {
            starts.retain(|(s, _)| *s != section);
            starts.push((section, index));
        }
    }

    let has = |section: AmplitudeSection| starts.iter().any(|(s, _)| *s == section);
    let mut tables = AmplitudeTables {
        restricted: !has(AmplitudeSection::SinglesBeta) && !has(AmplitudeSection::DoublesBeta),
        ..Default::default()
    };

    for (section, header_index) in starts {
        for (offset, raw) in lines[header_index + 1..].iter().enumerate() {
            let line_no = header_index + offset + 2;
            let tokens: Vec<&str> = raw.as_ref().split_whitespace().collect();
            if tokens.is_empty() {
                break;
            }
            if section.is_singles() {
                require_columns(&tokens, 3, line_no)?;
                let row = SingleAmplitude {
                    i: parse_index(tokens[0], line_no)?,
                    a: parse_index(tokens[1], line_no)?,
                    value: parse_value(tokens[2], line_no)?,
                    line: line_no,
                };
                match section {
                    AmplitudeSection::SinglesAlpha => tables.singles_alpha.push(row),
                    _ => tables.singles_beta.push(row),
                }
            } else {
                require_columns(&tokens, 5, line_no)?;
                let row = DoubleAmplitude {
                    i: parse_index(tokens[0], line_no)?,
                    j: parse_index(tokens[1], line_no)?,
                    a: parse_index(tokens[2], line_no)?,
                    b: parse_index(tokens[3], line_no)?,
                    value: parse_value(tokens[4], line_no)?,
                    line: line_no,
                };
                match section {
                    AmplitudeSection::DoublesAlpha => tables.doubles_alpha.push(row),
                    AmplitudeSection::DoublesBeta => tables.doubles_beta.push(row),
                    _ => tables.doubles_mixed.push(row),
                }
            }
        }
    }

    debug!(
        "Amplitude tables: {} TIA, {} Tia, {} TIJAB, {} Tijab, {} TIjAb, restricted = {}",
        tables.singles_alpha.len(),
        tables.singles_beta.len(),
        tables.doubles_alpha.len(),
        tables.doubles_beta.len(),
        tables.doubles_mixed.len(),
        tables.restricted
    );
    Ok(tables)
}

/// Maps spatial occupied/virtual indices to interleaved spin-orbital indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpinOrbitalIndexer {
    /// Number of alpha electrons
    pub n_alpha: usize,
    /// Number of beta electrons
    pub n_beta: usize,
}

impl SpinOrbitalIndexer {
    /// Occupied alpha orbital `i`; `None` on overflow.
    pub fn alpha_occupied(&self, i: usize) -> Option<usize> {
        i.checked_mul(2)
    }

    /// Virtual alpha orbital `a`, counted from the first alpha virtual.
    pub fn alpha_unoccupied(&self, a: usize) -> Option<usize> {
        a.checked_add(self.n_alpha)?.checked_mul(2)
    }

    /// Occupied beta orbital `i`; `None` on overflow.
    pub fn beta_occupied(&self, i: usize) -> Option<usize> {
        i.checked_mul(2)?.checked_add(1)
    }

    /// Virtual beta orbital `a`, counted from the first beta virtual.
    pub fn beta_unoccupied(&self, a: usize) -> Option<usize> {
        a.checked_add(self.n_beta)?.checked_mul(2)?.checked_add(1)
    }
}

/// Checks a mapped index against the tensor dimension.
///
/// An index whose mapping overflowed is reported with the raw row indices.
fn checked_slot<const N: usize>(
    mapped: [Option<usize>; N],
    row: [usize; N],
    n_spin_orbitals: usize,
    line: usize,
) -> Result<[usize; N]> {
    let out_of_range = |index: Vec<usize>| AmplitudeError::IndexOutOfRange {
        index,
        n_spin_orbitals,
        line,
    };
    let mut slot = [0; N];
    for (target, value) in slot.iter_mut().zip(mapped) {
        *target = value.ok_or_else(|| out_of_range(row.to_vec()))?;
    }
    if slot.iter().any(|&k| k >= n_spin_orbitals) {
        return Err(out_of_range(slot.to_vec()));
    }
    Ok(slot)
}

/// Spin-orbital CCSD amplitudes.
#[derive(Debug, Clone, PartialEq)]
pub struct CcsdAmplitudes {
    /// `t[a, i]`, shape `(n, n)`
    pub single_amplitudes: Array2<f64>,
    /// `t[a, i, b, j] / 2`, shape `(n, n, n, n)`
    pub double_amplitudes: Array4<f64>,
}

impl CcsdAmplitudes {
    /// Zero tensors over `n_spin_orbitals` spin orbitals.
    pub fn zeros(n_spin_orbitals: usize) -> Self {
        let n = n_spin_orbitals;
        Self {
            single_amplitudes: Array2::zeros((n, n)),
            double_amplitudes: Array4::zeros((n, n, n, n)),
        }
    }

    /// Number of spin orbitals.
    pub fn n_spin_orbitals(&self) -> usize {
        self.single_amplitudes.nrows()
    }

    fn set_single(&mut self, index: [Option<usize>; 2], row: [usize; 2], value: f64, line: usize) -> Result<()> {
        let slot = checked_slot(index, row, self.n_spin_orbitals(), line)?;
        self.single_amplitudes[slot] = value;
        Ok(())
    }

    fn set_double(&mut self, index: [Option<usize>; 4], row: [usize; 4], value: f64, line: usize) -> Result<()> {
        let slot = checked_slot(index, row, self.n_spin_orbitals(), line)?;
        self.double_amplitudes[slot] = value;
        Ok(())
    }

    /// Non-zero singles as `([a, i], value)`.
    pub fn nonzero_singles(&self) -> Vec<([usize; 2], f64)> {
        self.single_amplitudes
            .indexed_iter()
            .filter(|(_, v)| **v != 0.0)
            .map(|((a, i), v)| ([a, i], *v))
            .collect()
    }

    /// Non-zero doubles as `([a, i, b, j], value)`.
    pub fn nonzero_doubles(&self) -> Vec<([usize; 4], f64)> {
        self.double_amplitudes
            .indexed_iter()
            .filter(|(_, v)| **v != 0.0)
            .map(|((a, i, b, j), v)| ([a, i, b, j], *v))
            .collect()
    }
}

/// Lists the non-zero amplitudes, one per line, in `a i` and `a i b j` order.
impl fmt::Display for CcsdAmplitudes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Singles (a i):")?;
        for ([a, i], value) in self.nonzero_singles() {
            writeln!(f, "  {:>4} {:>4}            {:>16.10}", a, i, value)?;
        }
        writeln!(f, "Doubles (a i b j):")?;
        for ([a, i, b, j], value) in self.nonzero_doubles() {
            writeln!(f, "  {:>4} {:>4} {:>4} {:>4}  {:>16.10}", a, i, b, j, value)?;
        }
        Ok(())
    }
}

/// Fills spin-orbital tensors from the parsed tables.
pub fn amplitudes_from_tables(
    tables: &AmplitudeTables,
    n_spin_orbitals: usize,
    n_alpha: usize,
    n_beta: usize,
) -> Result<CcsdAmplitudes> {
    let idx = SpinOrbitalIndexer { n_alpha, n_beta };
    let mut amps = CcsdAmplitudes::zeros(n_spin_orbitals);

    for t in &tables.singles_alpha {
        let row = [t.a, t.i];
        amps.set_single([idx.alpha_unoccupied(t.a), idx.alpha_occupied(t.i)], row, t.value, t.line)?;
        if tables.restricted {
            amps.set_single([idx.beta_unoccupied(t.a), idx.beta_occupied(t.i)], row, t.value, t.line)?;
        }
    }
    for t in &tables.singles_beta {
        amps.set_single([idx.beta_unoccupied(t.a), idx.beta_occupied(t.i)], [t.a, t.i], t.value, t.line)?;
    }

    for t in &tables.doubles_alpha {
        let row = [t.a, t.i, t.b, t.j];
        let half = t.value / 2.0;
        amps.set_double(
            [
                idx.alpha_unoccupied(t.a),
                idx.alpha_occupied(t.i),
                idx.alpha_unoccupied(t.b),
                idx.alpha_occupied(t.j),
            ],
            row,
            half,
            t.line,
        )?;
        if tables.restricted {
            amps.set_double(
                [
                    idx.beta_unoccupied(t.a),
                    idx.beta_occupied(t.i),
                    idx.beta_unoccupied(t.b),
                    idx.beta_occupied(t.j),
                ],
                row,
                half,
                t.line,
            )?;
        }
    }
    for t in &tables.doubles_beta {
        amps.set_double(
            [
                idx.beta_unoccupied(t.a),
                idx.beta_occupied(t.i),
                idx.beta_unoccupied(t.b),
                idx.beta_occupied(t.j),
            ],
            [t.a, t.i, t.b, t.j],
            t.value / 2.0,
            t.line,
        )?;
    }
    for t in &tables.doubles_mixed {
        let row = [t.a, t.i, t.b, t.j];
        let half = t.value / 2.0;
        amps.set_double(
            [
                idx.alpha_unoccupied(t.a),
                idx.alpha_occupied(t.i),
                idx.beta_unoccupied(t.b),
                idx.beta_occupied(t.j),
            ],
            row,
            half,
            t.line,
        )?;
        if tables.restricted {
            amps.set_double(
                [
                    idx.beta_unoccupied(t.a),
                    idx.beta_occupied(t.i),
                    idx.alpha_unoccupied(t.b),
                    idx.alpha_occupied(t.j),
                ],
                row,
                half,
                t.line,
            )?;
        }
    }

    Ok(amps)
}

/// Parses CCSD amplitudes from transcript lines.
///
/// Missing tables leave the corresponding entries zero.
pub fn parse_ccsd_amplitudes<S: AsRef<str>>(
    lines: &[S],
    n_spin_orbitals: usize,
    n_alpha: usize,
    n_beta: usize,
) -> Result<CcsdAmplitudes> {
    let tables = scan_amplitude_tables(lines)?;
    amplitudes_from_tables(&tables, n_spin_orbitals, n_alpha, n_beta)
}

/// Reads and parses a Psi4 output transcript.
pub fn read_ccsd_amplitudes(
    path: &Path,
    n_spin_orbitals: usize,
    n_alpha: usize,
    n_beta: usize,
) -> Result<CcsdAmplitudes> {
    let content = fs::read_to_string(path)?;
    let lines: Vec<&str> = content.lines().collect();
    parse_ccsd_amplitudes(&lines, n_spin_orbitals, n_alpha, n_beta)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &str) -> Vec<&str> {
        text.lines().collect()
    }

    #[test]
    fn test_detect_headers() {
        assert_eq!(
            AmplitudeSection::detect("      Largest TIjAb Amplitudes:"),
            Some(AmplitudeSection::DoublesMixed)
        );
        assert_eq!(
            AmplitudeSection::detect("Largest Tia Amplitudes:"),
            Some(AmplitudeSection::SinglesBeta)
        );
        assert_eq!(AmplitudeSection::detect("Largest amplitudes"), None);
        assert_eq!(AmplitudeSection::DoublesBeta.header(), "Largest Tijab Amplitudes:");
    }

    #[test]
    fn test_indexer() {
        let idx = SpinOrbitalIndexer { n_alpha: 2, n_beta: 1 };
        assert_eq!(idx.alpha_occupied(1), Some(2));
        assert_eq!(idx.beta_occupied(1), Some(3));
        assert_eq!(idx.alpha_unoccupied(0), Some(4));
        assert_eq!(idx.beta_unoccupied(0), Some(3));
        assert_eq!(idx.alpha_unoccupied(usize::MAX), None);
        assert_eq!(idx.beta_occupied(usize::MAX / 2 + 1), None);
    }

    #[test]
    fn test_scan_reads_until_blank_line() {
        let text = "\
   Largest TIA Amplitudes:
              0   0         0.0100000000
              0   1        -0.0200000000

   trailing text that is not a row
";
        let tables = scan_amplitude_tables(&lines(text)).unwrap();
        assert_eq!(tables.singles_alpha.len(), 2);
        assert_eq!(tables.singles_alpha[1].a, 1);
        assert_eq!(tables.singles_alpha[1].value, -0.02);
        assert_eq!(tables.singles_alpha[1].line, 3);
        assert!(tables.restricted);
    }

    #[test]
    fn test_last_header_occurrence_wins() {
        let text = "\
Largest TIA Amplitudes:
  0 0 0.5

Largest TIA Amplitudes:
  0 0 0.25
";
        let amps = parse_ccsd_amplitudes(&lines(text), 4, 1, 1).unwrap();
        assert_eq!(amps.single_amplitudes[[2, 0]], 0.25);
    }

    #[test]
    fn test_restricted_singles_are_mirrored() {
        let text = "Largest TIA Amplitudes:\n  0 0 0.125\n";
        let amps = parse_ccsd_amplitudes(&lines(text), 4, 1, 1).unwrap();
        assert_eq!(amps.single_amplitudes[[2, 0]], 0.125);
        assert_eq!(amps.single_amplitudes[[3, 1]], 0.125);
        assert_eq!(amps.nonzero_singles().len(), 2);
    }

    #[test]
    fn test_unrestricted_singles_are_separate() {
        let text = "\
Largest TIA Amplitudes:
  0 0 0.125

Largest Tia Amplitudes:
  0 0 -0.5
";
        let amps = parse_ccsd_amplitudes(&lines(text), 6, 2, 1).unwrap();
        assert_eq!(amps.single_amplitudes[[4, 0]], 0.125);
        assert_eq!(amps.single_amplitudes[[3, 1]], -0.5);
        assert_eq!(amps.nonzero_singles().len(), 2);
    }

    #[test]
    fn test_short_row_is_format_error() {
        let text = "Largest TIJAB Amplitudes:\n  0 0 0 0.05\n";
        match parse_ccsd_amplitudes(&lines(text), 4, 1, 1) {
            Err(AmplitudeError::Format { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_non_numeric_token_is_format_error() {
        let text = "Largest TIA Amplitudes:\n  0 x 0.05\n";
        assert!(matches!(
            parse_ccsd_amplitudes(&lines(text), 4, 1, 1),
            Err(AmplitudeError::Format { line: 2, .. })
        ));
    }

    #[test]
    fn test_index_outside_tensor() {
        let text = "Largest TIA Amplitudes:\n  0 5 0.05\n";
        match parse_ccsd_amplitudes(&lines(text), 4, 1, 1) {
            Err(AmplitudeError::IndexOutOfRange {
                index,
                n_spin_orbitals,
                line,
            }) => {
                assert_eq!(index, vec![12, 0]);
                assert_eq!(n_spin_orbitals, 4);
                assert_eq!(line, 2);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_index_overflowing_the_mapping() {
        let text = format!("Largest TIA Amplitudes:\n  0 {} 0.05\n", usize::MAX);
        match parse_ccsd_amplitudes(&lines(&text), 4, 1, 1) {
            Err(AmplitudeError::IndexOutOfRange { index, line, .. }) => {
                assert_eq!(index, vec![usize::MAX, 0]);
                assert_eq!(line, 2);
            }
            other => panic!("unexpected: {:?}", other),
        }

        let text = format!("Largest TIjAb Amplitudes:\n  {} 0 0 0 0.05\n", usize::MAX / 2 + 1);
        assert!(matches!(
            parse_ccsd_amplitudes(&lines(&text), 4, 1, 1),
            Err(AmplitudeError::IndexOutOfRange { line: 2, .. })
        ));
    }

    #[test]
    fn test_display_lists_virtual_index_first() {
        let mut amplitudes = CcsdAmplitudes::zeros(4);
        amplitudes.single_amplitudes[[2, 0]] = 0.125;
        amplitudes.double_amplitudes[[3, 1, 2, 0]] = -0.034;
        let text = amplitudes.to_string();
        let lines: Vec<Vec<&str>> = text.lines().map(|l| l.split_whitespace().collect()).collect();

        assert_eq!(lines[0], vec!["Singles", "(a", "i):"]);
        assert_eq!(lines[1], vec!["2", "0", "0.1250000000"]);
        assert_eq!(lines[2], vec!["Doubles", "(a", "i", "b", "j):"]);
        assert_eq!(lines[3], vec!["3", "1", "2", "0", "-0.0340000000"]);
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_no_tables_gives_zeros() {
        let amps = parse_ccsd_amplitudes(&lines("SCF done\n"), 4, 1, 1).unwrap();
        assert_eq!(amps.single_amplitudes.shape(), &[4, 4]);
        assert_eq!(amps.double_amplitudes.shape(), &[4, 4, 4, 4]);
        assert!(amps.nonzero_singles().is_empty());
        assert!(amps.nonzero_doubles().is_empty());
    }
}
