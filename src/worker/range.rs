//! Byte-range request parsing.
//!
//! Only the single-range form of `Range: bytes=...` is honoured; multi-range
//! requests and anything malformed fall back to serving the full body, which
//! is what clients expect from a server that ignores the header.

/// How a `Range` header resolves against a blob of known size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpec {
    /// No usable range; serve the whole blob with 200.
    Full,
    /// Serve `start..=end` with 206 and a `Content-Range`.
    Satisfiable { start: u64, end: u64 },
    /// Range lies entirely past the end; answer 416.
    Unsatisfiable,
}

pub fn parse(header: Option<&str>, size: u64) -> RangeSpec {
    let header = match header {
        Some(header) => header,
        None => return RangeSpec::Full,
    };
    let spec = match header.strip_prefix("bytes=") {
        Some(spec) => spec.trim(),
        None => return RangeSpec::Full,
    };
    if spec.contains(',') {
        return RangeSpec::Full;
    }
    let (start_str, end_str) = match spec.split_once('-') {
        Some(parts) => parts,
        None => return RangeSpec::Full,
    };

    // Suffix form: the last N bytes.
    if start_str.is_empty() {
        let suffix = match end_str.parse::<u64>() {
            Ok(suffix) => suffix,
            Err(_) => return RangeSpec::Full,
        };
        if suffix == 0 || size == 0 {
            return RangeSpec::Unsatisfiable;
        }
        return RangeSpec::Satisfiable {
            start: size.saturating_sub(suffix),
            end: size - 1,
        };
    }

    let start = match start_str.parse::<u64>() {
        Ok(start) => start,
        Err(_) => return RangeSpec::Full,
    };
    if start >= size {
        return RangeSpec::Unsatisfiable;
    }

    let end = if end_str.is_empty() {
        size - 1
    } else {
        match end_str.parse::<u64>() {
            Ok(end) => end.min(size - 1),
            Err(_) => return RangeSpec::Full,
        }
    };
    if end < start {
        return RangeSpec::Full;
    }

    RangeSpec::Satisfiable { start, end }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_header_serves_everything() {
        assert_eq!(parse(None, 100), RangeSpec::Full);
        assert_eq!(parse(Some("items=0-5"), 100), RangeSpec::Full);
    }

    #[test]
    fn plain_range_is_honoured() {
        assert_eq!(
            parse(Some("bytes=0-49"), 100),
            RangeSpec::Satisfiable { start: 0, end: 49 }
        );
        assert_eq!(
            parse(Some("bytes=10-10"), 100),
            RangeSpec::Satisfiable { start: 10, end: 10 }
        );
    }

    #[test]
    fn end_is_clamped_to_the_blob() {
        assert_eq!(
            parse(Some("bytes=90-500"), 100),
            RangeSpec::Satisfiable { start: 90, end: 99 }
        );
    }

    #[test]
    fn open_ended_range_runs_to_eof() {
        assert_eq!(
            parse(Some("bytes=40-"), 100),
            RangeSpec::Satisfiable { start: 40, end: 99 }
        );
    }

    #[test]
    fn suffix_range_takes_the_tail() {
        assert_eq!(
            parse(Some("bytes=-10"), 100),
            RangeSpec::Satisfiable { start: 90, end: 99 }
        );
        // Longer than the blob: the whole blob.
        assert_eq!(
            parse(Some("bytes=-500"), 100),
            RangeSpec::Satisfiable { start: 0, end: 99 }
        );
    }

    #[test]
    fn start_at_or_past_eof_is_unsatisfiable() {
        assert_eq!(parse(Some("bytes=100-"), 100), RangeSpec::Unsatisfiable);
        assert_eq!(parse(Some("bytes=100-200"), 100), RangeSpec::Unsatisfiable);
        assert_eq!(parse(Some("bytes=5000-"), 100), RangeSpec::Unsatisfiable);
    }

    #[test]
    fn empty_blob_never_satisfies_a_range() {
        assert_eq!(parse(Some("bytes=0-"), 0), RangeSpec::Unsatisfiable);
        assert_eq!(parse(Some("bytes=-1"), 0), RangeSpec::Unsatisfiable);
    }

    #[test]
    fn multi_range_and_garbage_fall_back_to_full() {
        assert_eq!(parse(Some("bytes=0-1,5-9"), 100), RangeSpec::Full);
        assert_eq!(parse(Some("bytes=abc-def"), 100), RangeSpec::Full);
        assert_eq!(parse(Some("bytes=50-10"), 100), RangeSpec::Full);
        assert_eq!(parse(Some("bytes=-0"), 100), RangeSpec::Unsatisfiable);
    }
}
