use super::bins::MAX_COORDINATE;
use crate::{
    Result,
    error::{BuildError, IndexError},
};

/// Preset bit marking 0-based, half-open source coordinates (BED/UCSC convention)
pub const FLAG_ZERO_BASED: i32 = 0x10000;

/// Line layout families understood by the indexer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Format {
    /// Generic tab-delimited records with explicit begin/end columns
    #[default]
    Generic,
    /// SAM alignments; the end is derived from the CIGAR string
    Sam,
    /// VCF variants; the end is derived from REF or the `END` INFO key
    Vcf,
}
impl Format {
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::Generic => 0,
            Self::Sam => 1,
            Self::Vcf => 2,
        }
    }

    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            0 => Ok(Self::Generic),
            1 => Ok(Self::Sam),
            2 => Ok(Self::Vcf),
            _ => Err(IndexError::InvalidFormat(code).into()),
        }
    }
}

/// Describes where the interval of a record lives on each line.
///
/// Columns are 1-based, as stored in the index file. An `end_col` of zero means the
/// record has no end column and covers a single base.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct IndexConfig {
    /// Layout family of the records
    pub format: Format,
    /// Whether begin coordinates are 0-based (BED) rather than 1-based
    pub zero_based: bool,
    /// Column holding the sequence name
    pub seq_col: u32,
    /// Column holding the begin coordinate
    pub begin_col: u32,
    /// Column holding the end coordinate (0 if absent)
    pub end_col: u32,
    /// Lines starting with this byte are comments
    pub meta_char: u8,
    /// Number of leading lines to skip
    pub line_skip: u32,
}
impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            format: Format::Generic,
            zero_based: false,
            seq_col: 1,
            begin_col: 2,
            end_col: 3,
            meta_char: b'#',
            line_skip: 0,
        }
    }
}

/// Presets for common file layouts
impl IndexConfig {
    #[must_use]
    pub fn builder() -> IndexConfigBuilder {
        IndexConfigBuilder::default()
    }

    /// GFF/GTF: 1-based, name/begin/end in columns 1/4/5
    #[must_use]
    pub fn gff() -> Self {
        Self {
            begin_col: 4,
            end_col: 5,
            ..Self::default()
        }
    }

    /// BED: 0-based half-open, name/begin/end in columns 1/2/3
    #[must_use]
    pub fn bed() -> Self {
        Self {
            zero_based: true,
            ..Self::default()
        }
    }

    /// VCF: 1-based position in column 2, end derived from REF/INFO
    #[must_use]
    pub fn vcf() -> Self {
        Self {
            format: Format::Vcf,
            end_col: 0,
            ..Self::default()
        }
    }

    /// SAM: name/position in columns 3/4, end derived from CIGAR
    #[must_use]
    pub fn sam() -> Self {
        Self {
            format: Format::Sam,
            seq_col: 3,
            begin_col: 4,
            end_col: 0,
            meta_char: b'@',
            ..Self::default()
        }
    }
}

/// Serialized representation
impl IndexConfig {
    /// The preset word: format code plus coordinate convention flag
    #[must_use]
    pub fn preset(&self) -> i32 {
        let flag = if self.zero_based { FLAG_ZERO_BASED } else { 0 };
        self.format.code() | flag
    }

    /// Rebuilds a configuration from the raw header fields of an index
    pub fn from_raw(
        preset: i32,
        seq_col: i32,
        begin_col: i32,
        end_col: i32,
        meta: i32,
        skip: i32,
    ) -> Result<Self> {
        let unsigned = |field: &'static str, value: i32| {
            u32::try_from(value).map_err(|_| IndexError::NegativeLength { field, value })
        };
        Ok(Self {
            format: Format::from_code(preset & 0xffff)?,
            zero_based: preset & FLAG_ZERO_BASED != 0,
            seq_col: unsigned("sequence column", seq_col)?,
            begin_col: unsigned("begin column", begin_col)?,
            end_col: unsigned("end column", end_col)?,
            meta_char: meta as u8,
            line_skip: unsigned("line skip", skip)?,
        })
    }
}

/// Record parsing
impl IndexConfig {
    /// Whether the line is a comment line
    #[must_use]
    pub fn is_meta(&self, line: &[u8]) -> bool {
        line.first() == Some(&self.meta_char)
    }

    /// Extracts the sequence name and 0-based half-open interval of a record line
    pub fn parse_interval<'a>(
        &self,
        line: &'a [u8],
    ) -> std::result::Result<Interval<'a>, IntervalError> {
        let name = field(line, self.seq_col).ok_or(IntervalError::MissingColumn(self.seq_col))?;
        let begin = parse_column(line, self.begin_col)?;
        let start = if self.zero_based {
            begin
        } else {
            begin.checked_sub(1).ok_or(IntervalError::ZeroPosition)?
        };

        let end = match self.format {
            Format::Generic if self.end_col == 0 => checked_end(start, 1)?,
            Format::Generic => parse_column(line, self.end_col)?,
            Format::Vcf => vcf_end(line, start)?,
            Format::Sam => sam_end(line, start)?,
        };

        if end <= start {
            return Err(IntervalError::Empty { start, end });
        }
        if end > MAX_COORDINATE {
            return Err(IntervalError::Overflow { end });
        }
        Ok(Interval { name, start, end })
    }
}

/// The location of a record: sequence name plus a 0-based half-open interval
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Interval<'a> {
    pub name: &'a [u8],
    pub start: u64,
    pub end: u64,
}
impl Interval<'_> {
    /// Whether this interval intersects `[start, end)`
    #[must_use]
    pub fn overlaps(&self, start: u64, end: u64) -> bool {
        self.start < end && start < self.end
    }
}

/// Reasons a record line fails interval extraction
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum IntervalError {
    #[error("missing column {0}")]
    MissingColumn(u32),

    #[error("column {0} is not a non-negative integer")]
    InvalidNumber(u32),

    #[error("1-based position of 0")]
    ZeroPosition,

    #[error("empty or inverted interval [{start}, {end})")]
    Empty { start: u64, end: u64 },

    #[error("end {end} exceeds the maximum coordinate")]
    Overflow { end: u64 },

    #[error("invalid CIGAR string")]
    InvalidCigar,
}
impl IntervalError {
    /// Converts into a build error for input line `line`
    pub(crate) fn at_line(self, line: usize) -> BuildError {
        match self {
            Self::Overflow { end } => BuildError::CoordinateOverflow {
                line,
                end,
                max: MAX_COORDINATE,
            },
            other => BuildError::MalformedRecord {
                line,
                reason: other.to_string(),
            },
        }
    }
}

/// Builder for [`IndexConfig`], validating column choices on `build`
#[derive(Debug, Default, Clone)]
pub struct IndexConfigBuilder {
    format: Option<Format>,
    zero_based: Option<bool>,
    seq_col: Option<u32>,
    begin_col: Option<u32>,
    end_col: Option<u32>,
    meta_char: Option<u8>,
    line_skip: Option<u32>,
}
impl IndexConfigBuilder {
    #[must_use]
    pub fn format(mut self, format: Format) -> Self {
        self.format = Some(format);
        self
    }

    #[must_use]
    pub fn zero_based(mut self, zero_based: bool) -> Self {
        self.zero_based = Some(zero_based);
        self
    }

    #[must_use]
    pub fn seq_col(mut self, col: u32) -> Self {
        self.seq_col = Some(col);
        self
    }

    #[must_use]
    pub fn begin_col(mut self, col: u32) -> Self {
        self.begin_col = Some(col);
        self
    }

    #[must_use]
    pub fn end_col(mut self, col: u32) -> Self {
        self.end_col = Some(col);
        self
    }

    #[must_use]
    pub fn meta_char(mut self, meta_char: u8) -> Self {
        self.meta_char = Some(meta_char);
        self
    }

    #[must_use]
    pub fn line_skip(mut self, line_skip: u32) -> Self {
        self.line_skip = Some(line_skip);
        self
    }

    pub fn build(self) -> Result<IndexConfig> {
        let default = IndexConfig::default();
        let config = IndexConfig {
            format: self.format.unwrap_or(default.format),
            zero_based: self.zero_based.unwrap_or(default.zero_based),
            seq_col: self.seq_col.unwrap_or(default.seq_col),
            begin_col: self.begin_col.unwrap_or(default.begin_col),
            end_col: self.end_col.unwrap_or(default.end_col),
            meta_char: self.meta_char.unwrap_or(default.meta_char),
            line_skip: self.line_skip.unwrap_or(default.line_skip),
        };
        if config.seq_col == 0 || config.begin_col == 0 {
            return Err(BuildError::InvalidConfig(
                "sequence and begin columns are 1-based and must be non-zero".to_string(),
            )
            .into());
        }
        if config.seq_col == config.begin_col
            || config.end_col == config.seq_col
            || config.end_col == config.begin_col
        {
            return Err(BuildError::InvalidConfig(format!(
                "columns must be distinct (seq: {}, begin: {}, end: {})",
                config.seq_col, config.begin_col, config.end_col
            ))
            .into());
        }
        Ok(config)
    }
}

/// Returns the 1-based tab-delimited column `col` of `line`
fn field(line: &[u8], col: u32) -> Option<&[u8]> {
    let mut start = 0;
    let mut idx = 1;
    for tab in memchr::memchr_iter(b'\t', line) {
        if idx == col {
            return Some(&line[start..tab]);
        }
        start = tab + 1;
        idx += 1;
    }
    (idx == col).then(|| &line[start..])
}

fn parse_u64(bytes: &[u8]) -> Option<u64> {
    if bytes.is_empty() {
        return None;
    }
    bytes.iter().try_fold(0u64, |acc, &b| {
        if b.is_ascii_digit() {
            acc.checked_mul(10)?.checked_add(u64::from(b - b'0'))
        } else {
            None
        }
    })
}

fn parse_column(line: &[u8], col: u32) -> std::result::Result<u64, IntervalError> {
    let raw = field(line, col).ok_or(IntervalError::MissingColumn(col))?;
    parse_u64(raw).ok_or(IntervalError::InvalidNumber(col))
}

/// VCF: `END=` from INFO if present, else POS + len(REF)
fn vcf_end(line: &[u8], start: u64) -> std::result::Result<u64, IntervalError> {
    if let Some(info) = field(line, 8) {
        for entry in info.split(|&b| b == b';') {
            if let Some(value) = entry.strip_prefix(b"END=") {
                return parse_u64(value).ok_or(IntervalError::InvalidNumber(8));
            }
        }
    }
    let reference = field(line, 4).ok_or(IntervalError::MissingColumn(4))?;
    checked_end(start, reference.len().max(1) as u64)
}

/// SAM: POS plus the reference span of the CIGAR string
fn sam_end(line: &[u8], start: u64) -> std::result::Result<u64, IntervalError> {
    let cigar = field(line, 6).ok_or(IntervalError::MissingColumn(6))?;
    if cigar == b"*" {
        return checked_end(start, 1);
    }
    let mut span = 0u64;
    let mut len = 0u64;
    for &b in cigar {
        if b.is_ascii_digit() {
            len = len
                .checked_mul(10)
                .and_then(|l| l.checked_add(u64::from(b - b'0')))
                .ok_or(IntervalError::InvalidCigar)?;
            continue;
        }
        match b {
            b'M' | b'D' | b'N' | b'=' | b'X' => {
                span = span.checked_add(len).ok_or(IntervalError::InvalidCigar)?;
            }
            b'I' | b'S' | b'H' | b'P' => {}
            _ => return Err(IntervalError::InvalidCigar),
        }
        len = 0;
    }
    checked_end(start, span.max(1))
}

fn checked_end(start: u64, span: u64) -> std::result::Result<u64, IntervalError> {
    start
        .checked_add(span)
        .ok_or(IntervalError::Overflow { end: u64::MAX })
}

#[cfg(test)]
mod testing {
    use super::*;

    #[test]
    fn test_field() {
        let line = b"chr1\tENSEMBL\tUTR\t1737\t2090";
        assert_eq!(field(line, 1), Some(&b"chr1"[..]));
        assert_eq!(field(line, 4), Some(&b"1737"[..]));
        assert_eq!(field(line, 5), Some(&b"2090"[..]));
        assert_eq!(field(line, 6), None);
    }

    #[test]
    fn test_gff_interval() {
        let config = IndexConfig::gff();
        let interval = config
            .parse_interval(b"chr1\tENSEMBL\tUTR\t1737\t2090\t.\t+\t.\tgene_id")
            .unwrap();
        assert_eq!(interval.name, b"chr1");
        assert_eq!((interval.start, interval.end), (1736, 2090));
    }

    #[test]
    fn test_bed_interval() {
        let config = IndexConfig::bed();
        let interval = config.parse_interval(b"chr2\t10\t20\tname").unwrap();
        assert_eq!((interval.start, interval.end), (10, 20));
    }

    #[test]
    fn test_no_end_column() {
        let config = IndexConfig::builder().end_col(0).build().unwrap();
        let interval = config.parse_interval(b"chrX\t100").unwrap();
        assert_eq!((interval.start, interval.end), (99, 100));
    }

    #[test]
    fn test_vcf_interval() {
        let config = IndexConfig::vcf();
        let snp = config
            .parse_interval(b"chr1\t100\trs1\tA\tG\t50\tPASS\tDP=10")
            .unwrap();
        assert_eq!((snp.start, snp.end), (99, 100));
        let deletion = config
            .parse_interval(b"chr1\t100\t.\tACGT\tA\t50\tPASS\tDP=10")
            .unwrap();
        assert_eq!((deletion.start, deletion.end), (99, 103));
        let sv = config
            .parse_interval(b"chr1\t100\t.\tN\t<DEL>\t50\tPASS\tSVTYPE=DEL;END=500")
            .unwrap();
        assert_eq!((sv.start, sv.end), (99, 500));
    }

    #[test]
    fn test_sam_interval() {
        let config = IndexConfig::sam();
        let read = config
            .parse_interval(b"r1\t0\tchr1\t100\t60\t10M5D3S2N\t*\t0\t0\tACGT\tIIII")
            .unwrap();
        assert_eq!(read.name, b"chr1");
        assert_eq!((read.start, read.end), (99, 116));
        let unmapped = config
            .parse_interval(b"r2\t4\tchr1\t100\t0\t*\t*\t0\t0\tACGT\tIIII")
            .unwrap();
        assert_eq!((unmapped.start, unmapped.end), (99, 100));
    }

    #[test]
    fn test_interval_errors() {
        let config = IndexConfig::default();
        assert_eq!(
            config.parse_interval(b"chr1\t10").unwrap_err(),
            IntervalError::MissingColumn(3)
        );
        assert_eq!(
            config.parse_interval(b"chr1\tten\t20").unwrap_err(),
            IntervalError::InvalidNumber(2)
        );
        assert_eq!(
            config.parse_interval(b"chr1\t0\t20").unwrap_err(),
            IntervalError::ZeroPosition
        );
        assert_eq!(
            config.parse_interval(b"chr1\t30\t20").unwrap_err(),
            IntervalError::Empty { start: 29, end: 20 }
        );
        assert!(matches!(
            config.parse_interval(b"chr1\t1\t600000000").unwrap_err(),
            IntervalError::Overflow { .. }
        ));
    }

    #[test]
    fn test_huge_begin_is_overflow() {
        let config = IndexConfig {
            end_col: 0,
            ..IndexConfig::bed()
        };
        assert_eq!(
            config
                .parse_interval(b"chr1\t18446744073709551615")
                .unwrap_err(),
            IntervalError::Overflow { end: u64::MAX }
        );

        let vcf = IndexConfig::vcf();
        assert_eq!(
            vcf.parse_interval(b"chr1\t18446744073709551615\t.\tACGT\tA\t.\t.\t.")
                .unwrap_err(),
            IntervalError::Overflow { end: u64::MAX }
        );

        let sam = IndexConfig::sam();
        let line = b"r1\t0\tchr1\t18446744073709551615\t60\t10M\t*\t0\t0\tACGT\t*";
        assert_eq!(
            sam.parse_interval(line).unwrap_err(),
            IntervalError::Overflow { end: u64::MAX }
        );
    }

    #[test]
    fn test_zero_length_bed_rejected() {
        let config = IndexConfig::bed();
        assert!(config.parse_interval(b"chr1\t10\t10").is_err());
    }

    #[test]
    fn test_preset_round_trip() -> Result<()> {
        let config = IndexConfig::bed();
        assert_eq!(config.preset(), FLAG_ZERO_BASED);
        let decoded = IndexConfig::from_raw(
            config.preset(),
            config.seq_col as i32,
            config.begin_col as i32,
            config.end_col as i32,
            i32::from(config.meta_char),
            config.line_skip as i32,
        )?;
        assert_eq!(decoded, config);
        assert!(IndexConfig::from_raw(7, 1, 2, 3, 35, 0).is_err());
        Ok(())
    }

    #[test]
    fn test_builder_validation() {
        assert!(IndexConfig::builder().seq_col(0).build().is_err());
        assert!(IndexConfig::builder().begin_col(1).build().is_err());
        let config = IndexConfig::builder()
            .seq_col(1)
            .begin_col(4)
            .end_col(5)
            .meta_char(b'#')
            .line_skip(2)
            .build()
            .unwrap();
        assert_eq!(config.line_skip, 2);
        assert_eq!(config.begin_col, 4);
    }

    #[test]
    fn test_is_meta() {
        let config = IndexConfig::default();
        assert!(config.is_meta(b"#header"));
        assert!(!config.is_meta(b"chr1\t1\t2"));
        assert!(!config.is_meta(b""));
    }
}
