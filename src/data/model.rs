// ---------------------------------------------------------------------------
// Sample – one kept row of a per-game CSV
// ---------------------------------------------------------------------------

/// A single training row: identifier, label and feature vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    /// `"{file_stem}_{row_index}"`.
    pub name: String,
    pub label: u8,
    pub features: Vec<u16>,
}

impl Sample {
    pub fn name_for(stem: &str, row_index: i64) -> String {
        format!("{stem}_{row_index}")
    }
}

// ---------------------------------------------------------------------------
// SampleBatch – column-oriented buffer flushed to a segment
// ---------------------------------------------------------------------------

/// Column-oriented buffer of samples sharing one feature width.
#[derive(Debug, Clone, Default)]
pub struct SampleBatch {
    pub names: Vec<String>,
    pub labels: Vec<u8>,
    /// Row-major, `len() * width` values.
    pub features: Vec<u16>,
    width: Option<usize>,
}

impl SampleBatch {
    pub fn with_capacity(rows: usize) -> Self {
        Self {
            names: Vec::with_capacity(rows),
            labels: Vec::with_capacity(rows),
            features: Vec::new(),
            width: None,
        }
    }

    /// Append a sample. The first sample fixes the batch width; later samples
    /// must match it (the CSV reader already rejects ragged rows).
    pub fn push(&mut self, sample: Sample) {
        let width = *self.width.get_or_insert(sample.features.len());
        debug_assert_eq!(width, sample.features.len());
        self.names.push(sample.name);
        self.labels.push(sample.label);
        self.features.extend_from_slice(&sample.features);
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn width(&self) -> usize {
        self.width.unwrap_or(0)
    }

    /// Feature values of row `i`.
    pub fn row(&self, i: usize) -> &[u16] {
        let w = self.width();
        &self.features[i * w..(i + 1) * w]
    }

    /// Empty the buffer but keep the width and allocations.
    pub fn clear(&mut self) {
        self.names.clear();
        self.labels.clear();
        self.features.clear();
    }
}

// ---------------------------------------------------------------------------
// StoredDataset – the store read back into memory
// ---------------------------------------------------------------------------

/// The three co-indexed arrays of a store, features padded to the store width.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredDataset {
    pub names: Vec<String>,
    pub labels: Vec<u8>,
    /// Row-major, `len() * columns` values.
    pub features: Vec<u16>,
    pub columns: usize,
}

/// Borrowed view of one stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredRow<'a> {
    pub name: &'a str,
    pub label: u8,
    pub features: &'a [u16],
}

impl StoredDataset {
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<StoredRow<'_>> {
        let name = self.names.get(i)?;
        let start = i * self.columns;
        Some(StoredRow {
            name,
            label: self.labels[i],
            features: &self.features[start..start + self.columns],
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = StoredRow<'_>> {
        (0..self.len()).filter_map(|i| self.get(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_tracks_width_and_rows() {
        let mut batch = SampleBatch::with_capacity(2);
        assert_eq!(batch.width(), 0);
        batch.push(Sample {
            name: Sample::name_for("game42", 7),
            label: 3,
            features: vec![1, 2, 3],
        });
        batch.push(Sample {
            name: "game42_8".into(),
            label: 4,
            features: vec![4, 5, 6],
        });
        assert_eq!(batch.names[0], "game42_7");
        assert_eq!(batch.width(), 3);
        assert_eq!(batch.row(1), &[4, 5, 6]);

        batch.clear();
        assert!(batch.is_empty());
        assert_eq!(batch.width(), 3);
    }

    #[test]
    fn stored_dataset_rows() {
        let ds = StoredDataset {
            names: vec!["a_0".into(), "a_1".into()],
            labels: vec![1, 2],
            features: vec![10, 11, 20, 21],
            columns: 2,
        };
        let row = ds.get(1).unwrap();
        assert_eq!(row.name, "a_1");
        assert_eq!(row.label, 2);
        assert_eq!(row.features, &[20, 21]);
        assert!(ds.get(2).is_none());
        assert_eq!(ds.iter().count(), 2);
    }
}
