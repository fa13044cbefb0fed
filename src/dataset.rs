//! Deterministic workload generation for dispatch benchmarks.
//!
//! A dataset is `count` samples of `arity` integer operands, stored row-major in a
//! single allocation and walked by a wrapping cursor so benchmark bodies can pull one
//! sample per invocation forever without reallocating.
//!
//! Generation is chunked: every block of [`CHUNK_LEN`] samples draws from its own
//! ChaCha stream (`set_stream(block index)`) of the generator keyed by the master
//! seed. Blocks are filled in parallel, and the output does not depend on how many
//! threads did the work.
//!
//! # Binary Format
//!
//! ```text
//! Header:
//!   magic: [u8; 8]  = b"DMB_WKLD"
//!   version: u32    = 1
//!   count: u64      = number of samples
//!   arity: u64      = operands per sample
//!   seed: u64       = seed used for generation
//!   domain: u8      = 0 signed32, 1 non-negative, 2 sequential
//!   reserved: [u8; 31] = zeros
//!
//! Body:
//!   values: [i64; count * arity]  (little endian, row-major)
//! ```

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::BenchError;

/// Magic bytes identifying the dataset format.
const MAGIC: &[u8; 8] = b"DMB_WKLD";

/// Current format version.
const FORMAT_VERSION: u32 = 1;

/// Header size in bytes.
pub const HEADER_SIZE: usize = 8 + 4 + 8 + 8 + 8 + 1 + 31; // magic + version + count + arity + seed + domain + reserved

/// Samples drawn from one RNG stream.
pub const CHUNK_LEN: usize = 4096;

/// Range of values a generated operand may take.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperandDomain {
    /// Any 32-bit signed value, widened to i64.
    #[default]
    Signed32,
    /// Strictly positive 32-bit values. Zero is left out because subtraction GCD
    /// never terminates on it.
    NonNegative,
    /// Every operand of sample `i` equals `i`.
    Sequential,
}

impl OperandDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperandDomain::Signed32 => "signed32",
            OperandDomain::NonNegative => "non_negative",
            OperandDomain::Sequential => "sequential",
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            OperandDomain::Signed32 => 0,
            OperandDomain::NonNegative => 1,
            OperandDomain::Sequential => 2,
        }
    }

    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(OperandDomain::Signed32),
            1 => Some(OperandDomain::NonNegative),
            2 => Some(OperandDomain::Sequential),
            _ => None,
        }
    }
}

/// Dataset metadata from the header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetMeta {
    pub count: u64,
    pub arity: u64,
    pub seed: u64,
    pub domain: OperandDomain,
}

/// Configuration for dataset generation.
#[derive(Debug, Clone)]
pub struct GenerateConfig {
    /// Number of samples to generate.
    pub count: usize,
    /// Operands per sample.
    pub arity: usize,
    /// Random seed for deterministic generation.
    pub seed: u64,
    pub domain: OperandDomain,
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            count: 100_000,
            arity: 2,
            seed: 999_666,
            domain: OperandDomain::Signed32,
        }
    }
}

/// One row of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkloadSample<'a> {
    /// Position of the sample in its dataset.
    pub index: usize,
    pub operands: &'a [i64],
}

impl WorkloadSample<'_> {
    #[inline]
    pub fn operand(&self, i: usize) -> i64 {
        self.operands[i]
    }
}

/// Derive a child seed from a master seed and an index (iteration, worker).
///
/// SplitMix64 finalizer over both inputs, so `(s, i + 1)` and `(s + 1, i)` map to
/// unrelated seeds.
pub fn derive_seed(master_seed: u64, index: u64) -> u64 {
    let mut z = master_seed
        .wrapping_mul(0x9e37_79b9_7f4a_7c15)
        .rotate_left(31)
        ^ index.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Generator for block `chunk` of the dataset seeded with `seed`.
fn chunk_rng(seed: u64, chunk: usize) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(chunk as u64);
    rng
}

/// Fixed-size, seeded sample table with a wrapping cursor.
///
/// Datasets are thread-confined: `next_index` takes `&mut self` and each worker owns
/// its own instance.
#[derive(Debug, Clone)]
pub struct IndexedDataset {
    values: Vec<i64>,
    count: usize,
    arity: usize,
    seed: u64,
    domain: OperandDomain,
    cursor: usize,
}

/// Generate `count` samples of `arity` signed operands from `seed`.
pub fn generate(seed: u64, count: usize, arity: usize) -> Result<IndexedDataset, BenchError> {
    generate_with(&GenerateConfig {
        count,
        arity,
        seed,
        domain: OperandDomain::Signed32,
    })
}

/// Generate a dataset from a full configuration.
pub fn generate_with(config: &GenerateConfig) -> Result<IndexedDataset, BenchError> {
    if config.count == 0 {
        return Err(BenchError::config("dataset count must be greater than zero"));
    }
    if config.arity == 0 {
        return Err(BenchError::config("dataset arity must be greater than zero"));
    }
    let len = config
        .count
        .checked_mul(config.arity)
        .ok_or_else(|| BenchError::config("dataset size overflows usize"))?;

    let mut values = vec![0i64; len];
    fill(&mut values, config.arity, config.seed, config.domain);

    Ok(IndexedDataset {
        values,
        count: config.count,
        arity: config.arity,
        seed: config.seed,
        domain: config.domain,
        cursor: 0,
    })
}

fn fill(values: &mut [i64], arity: usize, seed: u64, domain: OperandDomain) {
    let chunk_values = CHUNK_LEN * arity;
    values
        .par_chunks_mut(chunk_values)
        .enumerate()
        .for_each(|(chunk, slot)| {
            let first_sample = chunk * CHUNK_LEN;
            match domain {
                OperandDomain::Sequential => {
                    for (k, v) in slot.iter_mut().enumerate() {
                        *v = (first_sample + k / arity) as i64;
                    }
                }
                OperandDomain::Signed32 => {
                    let mut rng = chunk_rng(seed, chunk);
                    for v in slot.iter_mut() {
                        *v = i64::from(rng.gen::<i32>());
                    }
                }
                OperandDomain::NonNegative => {
                    let mut rng = chunk_rng(seed, chunk);
                    for v in slot.iter_mut() {
                        *v = i64::from(rng.gen_range(1..=i32::MAX));
                    }
                }
            }
        });
}

impl IndexedDataset {
    /// Number of samples.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Always false: empty datasets are rejected at construction.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn domain(&self) -> OperandDomain {
        self.domain
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn meta(&self) -> DatasetMeta {
        DatasetMeta {
            count: self.count as u64,
            arity: self.arity as u64,
            seed: self.seed,
            domain: self.domain,
        }
    }

    /// Row-major operand storage.
    pub fn values(&self) -> &[i64] {
        &self.values
    }

    /// Return the current cursor, then advance it by one modulo `len()`.
    #[inline]
    pub fn next_index(&mut self) -> usize {
        let i = self.cursor;
        self.cursor += 1;
        if self.cursor == self.count {
            self.cursor = 0;
        }
        i
    }

    /// Sample at the cursor; advances the cursor.
    #[inline]
    pub fn next_sample(&mut self) -> WorkloadSample<'_> {
        let index = self.next_index();
        let start = index * self.arity;
        WorkloadSample {
            index,
            operands: &self.values[start..start + self.arity],
        }
    }

    pub fn sample(&self, index: usize) -> Option<WorkloadSample<'_>> {
        if index >= self.count {
            return None;
        }
        let start = index * self.arity;
        Some(WorkloadSample {
            index,
            operands: &self.values[start..start + self.arity],
        })
    }

    /// Refill in place from a new seed and rewind the cursor.
    pub fn reseed(&mut self, seed: u64) {
        fill(&mut self.values, self.arity, seed, self.domain);
        self.seed = seed;
        self.cursor = 0;
    }

    /// Rewind the cursor without touching the data.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }
}

fn write_header<W: Write>(writer: &mut W, meta: &DatasetMeta) -> io::Result<()> {
    writer.write_all(MAGIC)?;
    writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
    writer.write_all(&meta.count.to_le_bytes())?;
    writer.write_all(&meta.arity.to_le_bytes())?;
    writer.write_all(&meta.seed.to_le_bytes())?;
    writer.write_all(&[meta.domain.to_byte()])?;
    writer.write_all(&[0u8; 31])?; // reserved
    Ok(())
}

fn read_header<R: Read>(reader: &mut R) -> io::Result<DatasetMeta> {
    let mut magic = [0u8; 8];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Invalid magic bytes: expected {:?}, got {:?}", MAGIC, magic),
        ));
    }

    let mut buf4 = [0u8; 4];
    let mut buf8 = [0u8; 8];

    reader.read_exact(&mut buf4)?;
    let version = u32::from_le_bytes(buf4);
    if version != FORMAT_VERSION {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Unsupported format version: {}", version),
        ));
    }

    reader.read_exact(&mut buf8)?;
    let count = u64::from_le_bytes(buf8);

    reader.read_exact(&mut buf8)?;
    let arity = u64::from_le_bytes(buf8);

    reader.read_exact(&mut buf8)?;
    let seed = u64::from_le_bytes(buf8);

    let mut domain = [0u8; 1];
    reader.read_exact(&mut domain)?;
    let domain = OperandDomain::from_byte(domain[0]).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Unknown operand domain tag: {}", domain[0]),
        )
    })?;

    let mut reserved = [0u8; 31];
    reader.read_exact(&mut reserved)?;

    Ok(DatasetMeta {
        count,
        arity,
        seed,
        domain,
    })
}

/// Write a dataset to a binary file.
pub fn write_dataset<P: AsRef<Path>>(path: P, dataset: &IndexedDataset) -> io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::with_capacity(64 * 1024, file);

    write_header(&mut writer, &dataset.meta())?;
    for v in dataset.values() {
        writer.write_all(&v.to_le_bytes())?;
    }

    writer.flush()?;
    Ok(())
}

/// Read dataset metadata from a file header.
pub fn read_dataset_meta<P: AsRef<Path>>(path: P) -> io::Result<DatasetMeta> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    read_header(&mut reader)
}

/// Load a dataset from a binary file. The cursor starts at 0.
pub fn load_dataset<P: AsRef<Path>>(path: P) -> io::Result<IndexedDataset> {
    let file = File::open(path)?;
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::with_capacity(64 * 1024, file);

    let meta = read_header(&mut reader)?;
    if meta.count == 0 || meta.arity == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "dataset count and arity must be non-zero",
        ));
    }

    // The header is untrusted until the body length agrees with it.
    let expected = expected_file_size(meta.count, meta.arity).ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidData, "dataset header size overflows")
    })?;
    if expected != file_len {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "header claims {} x {} operands ({expected} bytes), file has {file_len} bytes",
                meta.count, meta.arity
            ),
        ));
    }

    let invalid = |_| io::Error::new(io::ErrorKind::InvalidData, "dataset too large");
    let count = usize::try_from(meta.count).map_err(invalid)?;
    let arity = usize::try_from(meta.arity).map_err(invalid)?;
    let len = count
        .checked_mul(arity)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "dataset too large"))?;

    let mut values = Vec::with_capacity(len);
    let mut buf8 = [0u8; 8];
    for _ in 0..len {
        reader.read_exact(&mut buf8)?;
        values.push(i64::from_le_bytes(buf8));
    }

    Ok(IndexedDataset {
        values,
        count,
        arity,
        seed: meta.seed,
        domain: meta.domain,
        cursor: 0,
    })
}

/// Expected file size for a dataset, `None` if it does not fit in a `u64`.
pub fn expected_file_size(count: u64, arity: u64) -> Option<u64> {
    count
        .checked_mul(arity)?
        .checked_mul(8)?
        .checked_add(HEADER_SIZE as u64)
}
