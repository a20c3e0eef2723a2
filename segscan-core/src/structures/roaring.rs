//! Compressed doc-id sets
//!
//! A [`RoaringBitmap`] splits every `u32` into a 16-bit key and a 16-bit low
//! half. Values sharing a key live in one chunk, stored in whichever layout
//! is smallest for its contents:
//! - sorted: ascending low halves, for sparse chunks
//! - dense: a 65536-bit mask
//! - runs: inclusive `(first, extra)` ranges covering `first..=first + extra`
//!
//! Inverted-index postings and filter results are bitmaps over the doc-id
//! domain `[0, total_docs)`.
//!
//! Serialized form, little-endian:
//! `chunk_count: u32`, then per chunk `key: u16`, `tag: u8` and a body.
//! Sorted bodies are `len: u32` + `len` x `u16`, dense bodies are
//! 1024 x `u64`, run bodies are `len: u32` + `len` x (`u16`, `u16`).

use std::cmp::Ordering;
use std::io::{self, Write};
use std::ops::Range;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

const CHUNK_VALUES: usize = 1 << 16;
const DENSE_WORDS: usize = CHUNK_VALUES / 64;

/// Above this many values a sorted chunk outgrows the dense mask.
const SORTED_MAX: usize = 4096;

/// Key, tag and length prefix of the smallest serialized chunk.
const MIN_CHUNK_BYTES: usize = 7;

const TAG_SORTED: u8 = 0;
const TAG_DENSE: u8 = 1;
const TAG_RUNS: u8 = 2;

fn split(value: u32) -> (u16, u16) {
    ((value >> 16) as u16, value as u16)
}

fn join(key: u16, low: u16) -> u32 {
    ((key as u32) << 16) | low as u32
}

fn invalid(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

#[derive(Debug, Clone)]
enum Chunk {
    Sorted(Vec<u16>),
    Dense(Box<[u64; DENSE_WORDS]>),
    Runs(Vec<(u16, u16)>),
}

impl Chunk {
    /// Pick the layout for ascending, unique low halves.
    fn from_lows(lows: Vec<u16>) -> Self {
        let runs = runs_of(&lows);
        if runs.len() * 4 < (lows.len() * 2).min(DENSE_WORDS * 8) {
            Chunk::Runs(runs)
        } else if lows.len() > SORTED_MAX {
            let mut words = Box::new([0u64; DENSE_WORDS]);
            for &low in &lows {
                words[low as usize / 64] |= 1u64 << (low % 64);
            }
            Chunk::Dense(words)
        } else {
            Chunk::Sorted(lows)
        }
    }

    fn len(&self) -> usize {
        match self {
            Chunk::Sorted(lows) => lows.len(),
            Chunk::Dense(words) => words.iter().map(|w| w.count_ones() as usize).sum(),
            Chunk::Runs(runs) => runs.iter().map(|&(_, extra)| extra as usize + 1).sum(),
        }
    }

    fn contains(&self, low: u16) -> bool {
        match self {
            Chunk::Sorted(lows) => lows.binary_search(&low).is_ok(),
            Chunk::Dense(words) => words[low as usize / 64] & (1u64 << (low % 64)) != 0,
            Chunk::Runs(runs) => {
                let after = runs.partition_point(|&(first, _)| first <= low);
                after > 0 && {
                    let (first, extra) = runs[after - 1];
                    low - first <= extra
                }
            }
        }
    }

    fn insert(&mut self, low: u16) -> bool {
        match self {
            Chunk::Sorted(lows) => insert_sorted(lows, low),
            Chunk::Dense(words) => {
                let (word, bit) = (low as usize / 64, 1u64 << (low % 64));
                let fresh = words[word] & bit == 0;
                words[word] |= bit;
                fresh
            }
            Chunk::Runs(runs) => {
                let mut lows = expand_runs(runs);
                let fresh = insert_sorted(&mut lows, low);
                *self = Chunk::Sorted(lows);
                fresh
            }
        }
    }

    /// Low halves in ascending order.
    fn lows(&self) -> Vec<u16> {
        match self {
            Chunk::Sorted(lows) => lows.clone(),
            Chunk::Dense(words) => {
                let mut lows = Vec::new();
                for (i, &word) in words.iter().enumerate() {
                    let mut rest = word;
                    while rest != 0 {
                        lows.push((i * 64) as u16 + rest.trailing_zeros() as u16);
                        rest &= rest - 1;
                    }
                }
                lows
            }
            Chunk::Runs(runs) => expand_runs(runs),
        }
    }

    fn compact(&mut self) {
        *self = Chunk::from_lows(self.lows());
    }

    fn union(&self, other: &Chunk) -> Chunk {
        if let (Chunk::Dense(a), Chunk::Dense(b)) = (self, other) {
            let mut words = a.clone();
            for (word, &extra) in words.iter_mut().zip(b.iter()) {
                *word |= extra;
            }
            return Chunk::Dense(words);
        }

        let (a, b) = (self.lows(), other.lows());
        let mut merged = Vec::with_capacity(a.len() + b.len());
        let (mut i, mut j) = (0, 0);
        while i < a.len() && j < b.len() {
            match a[i].cmp(&b[j]) {
                Ordering::Less => {
                    merged.push(a[i]);
                    i += 1;
                }
                Ordering::Greater => {
                    merged.push(b[j]);
                    j += 1;
                }
                Ordering::Equal => {
                    merged.push(a[i]);
                    i += 1;
                    j += 1;
                }
            }
        }
        merged.extend_from_slice(&a[i..]);
        merged.extend_from_slice(&b[j..]);
        Chunk::from_lows(merged)
    }

    fn write<W: Write>(&self, out: &mut W) -> io::Result<()> {
        match self {
            Chunk::Sorted(lows) => {
                out.write_u8(TAG_SORTED)?;
                out.write_u32::<LittleEndian>(lows.len() as u32)?;
                for &low in lows {
                    out.write_u16::<LittleEndian>(low)?;
                }
            }
            Chunk::Dense(words) => {
                out.write_u8(TAG_DENSE)?;
                for &word in words.iter() {
                    out.write_u64::<LittleEndian>(word)?;
                }
            }
            Chunk::Runs(runs) => {
                out.write_u8(TAG_RUNS)?;
                out.write_u32::<LittleEndian>(runs.len() as u32)?;
                for &(first, extra) in runs {
                    out.write_u16::<LittleEndian>(first)?;
                    out.write_u16::<LittleEndian>(extra)?;
                }
            }
        }
        Ok(())
    }

    /// Decode one chunk body, rejecting layouts no writer produces.
    ///
    /// Every length is checked against the remaining input before anything
    /// is allocated.
    fn read(bytes: &mut &[u8]) -> io::Result<Self> {
        match bytes.read_u8()? {
            TAG_SORTED => {
                let len = bytes.read_u32::<LittleEndian>()? as usize;
                if len == 0 || len > CHUNK_VALUES || len * 2 > bytes.len() {
                    return Err(invalid(format!(
                        "sorted chunk of {} values in {} bytes",
                        len,
                        bytes.len()
                    )));
                }
                let mut lows = Vec::with_capacity(len);
                for _ in 0..len {
                    lows.push(bytes.read_u16::<LittleEndian>()?);
                }
                if lows.windows(2).any(|pair| pair[0] >= pair[1]) {
                    return Err(invalid("sorted chunk is not strictly ascending".into()));
                }
                Ok(Chunk::Sorted(lows))
            }
            TAG_DENSE => {
                let mut words = Box::new([0u64; DENSE_WORDS]);
                bytes.read_u64_into::<LittleEndian>(&mut words[..])?;
                if words.iter().all(|&word| word == 0) {
                    return Err(invalid("empty dense chunk".into()));
                }
                Ok(Chunk::Dense(words))
            }
            TAG_RUNS => {
                let len = bytes.read_u32::<LittleEndian>()? as usize;
                if len == 0 || len > CHUNK_VALUES / 2 || len * 4 > bytes.len() {
                    return Err(invalid(format!(
                        "run chunk of {} runs in {} bytes",
                        len,
                        bytes.len()
                    )));
                }
                let mut runs = Vec::with_capacity(len);
                // Lowest value the next run may start at
                let mut floor = 0u32;
                for _ in 0..len {
                    let first = bytes.read_u16::<LittleEndian>()?;
                    let extra = bytes.read_u16::<LittleEndian>()?;
                    let last = first as u32 + extra as u32;
                    if (first as u32) < floor || last > u16::MAX as u32 {
                        return Err(invalid(format!(
                            "run {}+{} overlaps its predecessor or leaves the chunk",
                            first, extra
                        )));
                    }
                    floor = last + 1;
                    runs.push((first, extra));
                }
                Ok(Chunk::Runs(runs))
            }
            tag => Err(invalid(format!("unknown chunk tag {}", tag))),
        }
    }
}

fn insert_sorted(lows: &mut Vec<u16>, low: u16) -> bool {
    match lows.binary_search(&low) {
        Ok(_) => false,
        Err(pos) => {
            lows.insert(pos, low);
            true
        }
    }
}

fn expand_runs(runs: &[(u16, u16)]) -> Vec<u16> {
    runs.iter()
        .flat_map(|&(first, extra)| first..=first + extra)
        .collect()
}

fn runs_of(lows: &[u16]) -> Vec<(u16, u16)> {
    let mut runs: Vec<(u16, u16)> = Vec::new();
    for &low in lows {
        match runs.last_mut() {
            Some((first, extra)) if *first as u32 + *extra as u32 + 1 == low as u32 => {
                *extra += 1
            }
            _ => runs.push((low, 0)),
        }
    }
    runs
}

/// Compressed set of `u32` values, chunked by their high 16 bits.
#[derive(Debug, Clone, Default)]
pub struct RoaringBitmap {
    /// Strictly ascending keys, no empty chunks.
    chunks: Vec<(u16, Chunk)>,
}

impl RoaringBitmap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from ascending values. Repeated values are kept once.
    pub fn from_sorted_slice(values: &[u32]) -> Self {
        debug_assert!(values.windows(2).all(|pair| pair[0] <= pair[1]));
        let mut chunks = Vec::new();
        let mut current: Option<u16> = None;
        let mut lows: Vec<u16> = Vec::new();
        for &value in values {
            let (key, low) = split(value);
            if current != Some(key) {
                if let Some(done) = current {
                    chunks.push((done, Chunk::from_lows(std::mem::take(&mut lows))));
                }
                current = Some(key);
            }
            if lows.last() != Some(&low) {
                lows.push(low);
            }
        }
        if let Some(done) = current {
            chunks.push((done, Chunk::from_lows(lows)));
        }
        Self { chunks }
    }

    /// Every value in `range`, one run per touched chunk.
    pub fn from_range(range: Range<u32>) -> Self {
        let mut chunks = Vec::new();
        if range.is_empty() {
            return Self { chunks };
        }
        let last = range.end - 1;
        let mut start = range.start;
        loop {
            let (key, first) = split(start);
            let chunk_last = last.min(join(key, u16::MAX));
            chunks.push((key, Chunk::Runs(vec![(first, (chunk_last - start) as u16)])));
            if chunk_last == last {
                break;
            }
            start = chunk_last + 1;
        }
        Self { chunks }
    }

    /// Add `value`; `false` if it was already present.
    pub fn insert(&mut self, value: u32) -> bool {
        let (key, low) = split(value);
        match self.chunks.binary_search_by_key(&key, |(k, _)| *k) {
            Ok(idx) => self.chunks[idx].1.insert(low),
            Err(idx) => {
                self.chunks.insert(idx, (key, Chunk::Sorted(vec![low])));
                true
            }
        }
    }

    pub fn contains(&self, value: u32) -> bool {
        let (key, low) = split(value);
        self.chunks
            .binary_search_by_key(&key, |(k, _)| *k)
            .is_ok_and(|idx| self.chunks[idx].1.contains(low))
    }

    pub fn cardinality(&self) -> u32 {
        self.chunks.iter().map(|(_, chunk)| chunk.len() as u32).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Union with `other` into a new bitmap.
    pub fn or(&self, other: &RoaringBitmap) -> RoaringBitmap {
        let mut chunks = Vec::with_capacity(self.chunks.len().max(other.chunks.len()));
        let mut left = self.chunks.iter().peekable();
        let mut right = other.chunks.iter().peekable();
        loop {
            let order = match (left.peek(), right.peek()) {
                (Some((a, _)), Some((b, _))) => a.cmp(b),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => break,
            };
            match order {
                Ordering::Less => chunks.extend(left.next().cloned()),
                Ordering::Greater => chunks.extend(right.next().cloned()),
                Ordering::Equal => {
                    if let (Some((key, a)), Some((_, b))) = (left.next(), right.next()) {
                        chunks.push((*key, a.union(b)));
                    }
                }
            }
        }
        RoaringBitmap { chunks }
    }

    pub fn serialize<W: Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_u32::<LittleEndian>(self.chunks.len() as u32)?;
        for (key, chunk) in &self.chunks {
            out.write_u16::<LittleEndian>(*key)?;
            chunk.write(out)?;
        }
        Ok(())
    }

    /// Decode a bitmap that occupies all of `bytes`.
    ///
    /// Malformed input (impossible counts, unordered keys or values, trailing
    /// bytes) is reported as [`io::ErrorKind::InvalidData`], truncation as
    /// [`io::ErrorKind::UnexpectedEof`].
    pub fn deserialize(mut bytes: &[u8]) -> io::Result<Self> {
        let count = bytes.read_u32::<LittleEndian>()? as usize;
        if count > CHUNK_VALUES || count * MIN_CHUNK_BYTES > bytes.len() {
            return Err(invalid(format!(
                "{} chunks cannot fit in {} bytes",
                count,
                bytes.len()
            )));
        }
        let mut chunks: Vec<(u16, Chunk)> = Vec::with_capacity(count);
        for _ in 0..count {
            let key = bytes.read_u16::<LittleEndian>()?;
            if let Some((prev, _)) = chunks.last() {
                if *prev >= key {
                    return Err(invalid(format!("chunk key {} after {}", key, prev)));
                }
            }
            chunks.push((key, Chunk::read(&mut bytes)?));
        }
        if !bytes.is_empty() {
            return Err(invalid(format!("{} trailing bytes", bytes.len())));
        }
        Ok(Self { chunks })
    }

    pub fn iter(&self) -> RoaringIter<'_> {
        RoaringIter::new(&self.chunks)
    }

    /// Values `>= start` in ascending order, skipping whole chunks below it.
    pub fn iter_from(&self, start: u32) -> impl Iterator<Item = u32> + '_ {
        let (key, _) = split(start);
        let first = self.chunks.partition_point(|&(k, _)| k < key);
        RoaringIter::new(&self.chunks[first..]).skip_while(move |&value| value < start)
    }
}

impl PartialEq for RoaringBitmap {
    fn eq(&self, other: &Self) -> bool {
        self.cardinality() == other.cardinality() && self.iter().eq(other.iter())
    }
}

impl Eq for RoaringBitmap {}

impl FromIterator<u32> for RoaringBitmap {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        let mut bitmap = Self::new();
        for value in iter {
            bitmap.insert(value);
        }
        for (_, chunk) in &mut bitmap.chunks {
            chunk.compact();
        }
        bitmap
    }
}

/// Ascending iterator over a [`RoaringBitmap`].
pub struct RoaringIter<'a> {
    chunks: std::slice::Iter<'a, (u16, Chunk)>,
    key: u16,
    lows: std::vec::IntoIter<u16>,
}

impl<'a> RoaringIter<'a> {
    fn new(chunks: &'a [(u16, Chunk)]) -> Self {
        Self {
            chunks: chunks.iter(),
            key: 0,
            lows: Vec::new().into_iter(),
        }
    }
}

impl Iterator for RoaringIter<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        loop {
            if let Some(low) = self.lows.next() {
                return Some(join(self.key, low));
            }
            let (key, chunk) = self.chunks.next()?;
            self.key = *key;
            self.lows = chunk.lows().into_iter();
        }
    }
}
