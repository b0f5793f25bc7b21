//! External textual data sources that simulate field data (spec §6). Out of
//! core scope per spec §1, but implemented here as thin, swappable boundary
//! adapters so the sender binary is runnable end to end.

use std::io::BufRead;

/// Supplies the next Boolean value for the GOOSE `allData` payload.
pub trait GooseDataSource {
    /// Returns the next value (`true` = closed / `0x01`, `false` = open /
    /// `0x00`) for the given running cycle counter.
    fn next_value(&mut self, s_value: u64) -> bool;
}

/// Reads `GOOSEdata.txt`: each row is a run of characters; the character at
/// index `s_value mod row_length` selects the Boolean value for that cycle.
pub struct GooseFileSource {
    rows: Vec<String>,
}

impl GooseFileSource {
    pub fn load(path: &str) -> std::io::Result<Self> {
        let file = std::fs::File::open(path)?;
        let rows = std::io::BufReader::new(file)
            .lines()
            .collect::<std::io::Result<Vec<String>>>()?
            .into_iter()
            .filter(|l| !l.trim().is_empty())
            .collect();
        Ok(Self { rows })
    }
}

impl GooseDataSource for GooseFileSource {
    fn next_value(&mut self, s_value: u64) -> bool {
        if self.rows.is_empty() {
            return false;
        }
        let row = &self.rows[(s_value as usize) % self.rows.len()];
        let chars: Vec<char> = row.chars().collect();
        if chars.is_empty() {
            return false;
        }
        chars[(s_value as usize) % chars.len()] == '1'
    }
}

/// Supplies the next 16-scalar sample group for the SV payload.
pub trait SvDataSource {
    fn next_samples(&mut self, cycle: u64) -> [f32; 16];
}

/// Reads `SVdata.txt`: each row is 16 whitespace-separated decimal floats
/// (4 voltages, 4 angles, 4 currents, 4 angles); one row is consumed per
/// cycle.
pub struct SvFileSource {
    rows: Vec<[f32; 16]>,
}

impl SvFileSource {
    pub fn load(path: &str) -> std::io::Result<Self> {
        let file = std::fs::File::open(path)?;
        let mut rows = Vec::new();
        for line in std::io::BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let values: Vec<f32> = line
                .split_whitespace()
                .filter_map(|tok| tok.parse().ok())
                .collect();
            if values.len() == 16 {
                let mut group = [0f32; 16];
                group.copy_from_slice(&values);
                rows.push(group);
            }
        }
        Ok(Self { rows })
    }
}

impl SvDataSource for SvFileSource {
    fn next_samples(&mut self, cycle: u64) -> [f32; 16] {
        if self.rows.is_empty() {
            return [0.0; 16];
        }
        self.rows[(cycle as usize) % self.rows.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn goose_file_source_selects_char_by_modulus() {
        let mut path = std::env::temp_dir();
        path.push("rgoose_goosedata_test.txt");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"0101\n")
            .unwrap();
        let mut src = GooseFileSource::load(path.to_str().unwrap()).unwrap();
        std::fs::remove_file(&path).ok();

        assert!(!src.next_value(0));
        assert!(src.next_value(1));
        assert!(!src.next_value(2));
        assert!(src.next_value(3));
        assert!(!src.next_value(4)); // wraps back to index 0
    }

    #[test]
    fn sv_file_source_parses_groups_of_sixteen() {
        let mut path = std::env::temp_dir();
        path.push("rgoose_svdata_test.txt");
        let row = (0..16).map(|i| i.to_string()).collect::<Vec<_>>().join(" ");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(row.as_bytes())
            .unwrap();
        let mut src = SvFileSource::load(path.to_str().unwrap()).unwrap();
        std::fs::remove_file(&path).ok();

        let samples = src.next_samples(0);
        assert_eq!(samples[0], 0.0);
        assert_eq!(samples[15], 15.0);
    }
}
