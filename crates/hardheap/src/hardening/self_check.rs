/// Result of walking the large-object index and checking every record.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IntegrityReport {
    pub records_checked: usize,
    /// Index key differs from the record's `user_start`.
    pub key_mismatch: usize,
    /// `user_start` is not a multiple of the record's alignment.
    pub misaligned: usize,
    /// `user_start` or `user_start + usable_size` falls outside the mapping.
    pub out_of_extent: usize,
    /// `usable_size < requested_size`.
    pub undersized: usize,
}

impl IntegrityReport {
    pub fn errors_found(&self) -> usize {
        self.key_mismatch + self.misaligned + self.out_of_extent + self.undersized
    }

    pub fn is_ok(&self) -> bool {
        self.errors_found() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checked_records_are_not_errors() {
        let clean = IntegrityReport {
            records_checked: 5,
            ..Default::default()
        };
        assert!(clean.is_ok());

        let bad = IntegrityReport {
            records_checked: 5,
            misaligned: 1,
            undersized: 2,
            ..Default::default()
        };
        assert_eq!(bad.errors_found(), 3);
        assert!(!bad.is_ok());
    }
}
