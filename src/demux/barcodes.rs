use rustc_hash::FxHashMap;

use crate::demux::error::{DemuxError, Result};

/// Fixed set of unique cell barcodes for one run. Order is the order of the
/// input barcode list and is the canonical row index for the likelihood and
/// posterior matrices.
#[derive(Debug, Clone, Default)]
pub struct BarcodeSet {
    names: Vec<String>,
    index: FxHashMap<String, usize>,
}

impl BarcodeSet {
    pub fn from_names<I>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut set = Self {
            names: Vec::new(),
            index: FxHashMap::default(),
        };
        for name in names {
            if set.index.contains_key(&name) {
                return Err(DemuxError::DuplicateBarcode(name));
            }
            set.index.insert(name.clone(), set.names.len());
            set.names.push(name);
        }
        Ok(set)
    }

    /// Index of a barcode; unknown barcodes are a lookup error, never a
    /// silent zero
    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| DemuxError::UnknownBarcode(name.to_string()))
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(|s| s.as_str())
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_follows_input_order() {
        let set =
            BarcodeSet::from_names(["AAAC".to_string(), "TTTG".to_string()]).unwrap();
        assert_eq!(set.index_of("AAAC").unwrap(), 0);
        assert_eq!(set.index_of("TTTG").unwrap(), 1);
        assert_eq!(set.get(1), Some("TTTG"));
    }

    #[test]
    fn test_duplicate_barcode_rejected() {
        let e = BarcodeSet::from_names(["AAAC".to_string(), "AAAC".to_string()])
            .unwrap_err();
        assert_eq!(e, DemuxError::DuplicateBarcode("AAAC".to_string()));
    }

    #[test]
    fn test_unknown_barcode_is_error() {
        let set = BarcodeSet::from_names(["AAAC".to_string()]).unwrap();
        assert!(matches!(
            set.index_of("GGGG"),
            Err(DemuxError::UnknownBarcode(_))
        ));
    }
}
