use crate::{CsvError, CsvResult};

/// Reader options. Immutable once handed to a reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvConfig {
    /// Treat the first line as column names.
    pub first_line_is_header: bool,
    /// When the first line is data, synthesize `column 1..N` names from its width.
    pub generate_default_headers_if_missing: bool,
    /// Single ASCII field separator.
    pub separator: char,
    /// The reader drops the source on close; otherwise `close` hands it back.
    pub reader_owns_stream: bool,
    /// Clear the mapping cache when the reader is closed or dropped.
    pub release_cache_on_dispose: bool,
    /// Fail header resolution on repeated column names instead of first-match lookup.
    pub reject_duplicate_headers: bool,
    /// Fail rows whose field count differs from the header count.
    pub strict_row_width: bool,
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self {
            first_line_is_header: true,
            generate_default_headers_if_missing: true,
            separator: ',',
            reader_owns_stream: true,
            release_cache_on_dispose: true,
            reject_duplicate_headers: false,
            strict_row_width: false,
        }
    }
}

impl CsvConfig {
    /// First line is data; headers are synthesized from its width.
    pub fn headerless() -> Self {
        Self {
            first_line_is_header: false,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> CsvResult<()> {
        if !self.separator.is_ascii() {
            return Err(CsvError::InvalidConfig(format!(
                "separator {:?} is not an ASCII character",
                self.separator
            )));
        }
        if matches!(self.separator, '\r' | '\n') {
            return Err(CsvError::InvalidConfig(
                "separator cannot be a line terminator".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn separator_byte(&self) -> u8 {
        // validate() guarantees ASCII
        self.separator as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = CsvConfig::default();
        assert!(config.first_line_is_header);
        assert!(config.generate_default_headers_if_missing);
        assert_eq!(config.separator, ',');
        assert!(config.reader_owns_stream);
        assert!(config.release_cache_on_dispose);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_non_ascii_and_line_breaks() {
        for sep in ['é', '\n', '\r'] {
            let config = CsvConfig {
                separator: sep,
                ..Default::default()
            };
            assert!(matches!(config.validate(), Err(CsvError::InvalidConfig(_))));
        }
        let tabs = CsvConfig {
            separator: '\t',
            ..CsvConfig::headerless()
        };
        assert!(tabs.validate().is_ok());
        assert_eq!(tabs.separator_byte(), b'\t');
    }
}
