//! The two lookup structures and their binary encodings.
//!
//! Both encodings are little-endian with a 4-byte magic, u64 counts and
//! length-prefixed UTF-8 keys. Entries are written in sorted key order so the
//! same contents always produce the same bytes.

use std::{collections::BTreeMap, io::{Cursor, Read, Write}};

use ahash::AHashMap;
use anyhow::{ensure, Context, Result};

use crate::index::{PlotId, PolyKey};

const PLOT_MAGIC: &[u8; 4] = b"BRPI";
const BIOMASS_MAGIC: &[u8; 4] = b"BRBI";

/// Polygons of one plot: identifiers and the byte offsets of their records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlotEntry {
    poly_ids: Vec<PolyKey>,
    offsets: Vec<u64>,
}

impl PlotEntry {
    /// Append a polygon; the two sequences stay position-aligned.
    pub fn push(&mut self, poly_id: PolyKey, offset: u64) {
        self.poly_ids.push(poly_id);
        self.offsets.push(offset);
    }

    #[inline] pub fn poly_ids(&self) -> &[PolyKey] { &self.poly_ids }

    #[inline] pub fn offsets(&self) -> &[u64] { &self.offsets }

    #[inline] pub fn len(&self) -> usize { self.poly_ids.len() }

    #[inline] pub fn is_empty(&self) -> bool { self.poly_ids.is_empty() }

    /// (polygon id, offset) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&PolyKey, u64)> {
        self.poly_ids.iter().zip(self.offsets.iter().copied())
    }
}

/// Plot identifier -> polygons of that plot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlotIndex {
    plots: BTreeMap<PlotId, PlotEntry>,
}

impl PlotIndex {
    pub fn new() -> Self { Self::default() }

    /// Record one polygon under a plot, creating the entry on first sight.
    pub fn insert(&mut self, plot: PlotId, poly_id: PolyKey, offset: u64) {
        self.plots.entry(plot).or_default().push(poly_id, offset);
    }

    #[inline] pub fn get(&self, plot: &PlotId) -> Option<&PlotEntry> { self.plots.get(plot) }

    #[inline] pub fn contains(&self, plot: &PlotId) -> bool { self.plots.contains_key(plot) }

    /// Number of distinct plots.
    #[inline] pub fn len(&self) -> usize { self.plots.len() }

    #[inline] pub fn is_empty(&self) -> bool { self.plots.is_empty() }

    /// Total number of indexed polygons across all plots.
    pub fn polygon_count(&self) -> usize { self.plots.values().map(PlotEntry::len).sum() }

    /// Plots in ascending numeric order.
    pub fn iter(&self) -> impl Iterator<Item = (&PlotId, &PlotEntry)> { self.plots.iter() }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        out.write_all(PLOT_MAGIC)?;
        write_u64(&mut out, self.plots.len() as u64)?;
        for (plot, entry) in &self.plots {
            out.write_all(&plot.as_f64().to_le_bytes())?;
            write_u64(&mut out, entry.len() as u64)?;
            for (poly_id, offset) in entry.iter() {
                write_str(&mut out, poly_id.as_str())?;
                write_u64(&mut out, offset)?;
            }
        }
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = Cursor::new(bytes);
        read_magic(&mut reader, PLOT_MAGIC)?;

        let num_plots = read_u64(&mut reader).context("[index::plot] Failed to read plot count")?;
        let mut plots = BTreeMap::new();
        for _ in 0..num_plots {
            let raw = read_f64(&mut reader).context("[index::plot] Failed to read plot id")?;
            let plot = PlotId::from_f64(raw)
                .with_context(|| format!("[index::plot] Non-finite plot id {raw}"))?;
            let n = read_u64(&mut reader).context("[index::plot] Failed to read polygon count")?;
            let mut entry = PlotEntry::default();
            for _ in 0..n {
                let poly_id = PolyKey::from_canonical(read_str(&mut reader)?);
                let offset = read_u64(&mut reader).context("[index::plot] Failed to read offset")?;
                entry.push(poly_id, offset);
            }
            ensure!(plots.insert(plot.clone(), entry).is_none(), "[index::plot] Duplicate plot {}", plot);
        }
        ensure_consumed(&reader, "plot")?;
        Ok(Self { plots })
    }
}

/// Polygon identifier -> biomass total dead.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BiomassIndex {
    values: AHashMap<PolyKey, f64>,
}

impl BiomassIndex {
    pub fn new() -> Self { Self::default() }

    /// Later rows for the same polygon replace earlier ones.
    pub fn insert(&mut self, poly_id: PolyKey, biomass: f64) {
        self.values.insert(poly_id, biomass);
    }

    #[inline] pub fn get(&self, poly_id: &str) -> Option<f64> { self.values.get(poly_id).copied() }

    #[inline] pub fn len(&self) -> usize { self.values.len() }

    #[inline] pub fn is_empty(&self) -> bool { self.values.is_empty() }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut sorted: Vec<(&PolyKey, &f64)> = self.values.iter().collect();
        sorted.sort_unstable_by(|a, b| a.0.cmp(b.0));

        let mut out = Vec::new();
        out.write_all(BIOMASS_MAGIC)?;
        write_u64(&mut out, sorted.len() as u64)?;
        for (poly_id, value) in sorted {
            write_str(&mut out, poly_id.as_str())?;
            out.write_all(&value.to_le_bytes())?;
        }
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = Cursor::new(bytes);
        read_magic(&mut reader, BIOMASS_MAGIC)?;

        let n = read_u64(&mut reader).context("[index::biomass] Failed to read record count")?;
        let mut values = AHashMap::with_capacity(n.min(1 << 24) as usize);
        for _ in 0..n {
            let poly_id = PolyKey::from_canonical(read_str(&mut reader)?);
            let value = read_f64(&mut reader).context("[index::biomass] Failed to read value")?;
            values.insert(poly_id, value);
        }
        ensure_consumed(&reader, "biomass")?;
        Ok(Self { values })
    }
}

fn write_u64<W: Write>(writer: &mut W, value: u64) -> Result<()> {
    writer.write_all(&value.to_le_bytes())?;
    Ok(())
}

fn write_str<W: Write>(writer: &mut W, s: &str) -> Result<()> {
    writer.write_all(&(s.len() as u32).to_le_bytes())?;
    writer.write_all(s.as_bytes())?;
    Ok(())
}

fn read_magic<R: Read>(reader: &mut R, expected: &[u8; 4]) -> Result<()> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)
        .context("[index] Failed to read magic bytes")?;
    ensure!(&magic == expected, "[index] Invalid magic: expected {:?}", String::from_utf8_lossy(expected));
    Ok(())
}

fn read_u64<R: Read>(reader: &mut R) -> Result<u64> {
    let mut b8 = [0u8; 8];
    reader.read_exact(&mut b8)?;
    Ok(u64::from_le_bytes(b8))
}

fn read_f64<R: Read>(reader: &mut R) -> Result<f64> {
    let mut b8 = [0u8; 8];
    reader.read_exact(&mut b8)?;
    Ok(f64::from_le_bytes(b8))
}

fn read_str<R: Read>(reader: &mut R) -> Result<String> {
    let mut b4 = [0u8; 4];
    reader.read_exact(&mut b4).context("[index] Failed to read key length")?;
    let mut buf = vec![0u8; u32::from_le_bytes(b4) as usize];
    reader.read_exact(&mut buf).context("[index] Failed to read key")?;
    String::from_utf8(buf).context("[index] Key is not valid UTF-8")
}

fn ensure_consumed(reader: &Cursor<&[u8]>, what: &str) -> Result<()> {
    let total = reader.get_ref().len() as u64;
    ensure!(
        reader.position() == total,
        "[index::{}] {} trailing bytes after last record",
        what,
        total - reader.position()
    );
    Ok(())
}
