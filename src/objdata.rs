//! The `\objdata` payload machine.
//!
//! Text delivered to a bound frame is hex-decoded and run through a small
//! state machine over the decoded stream: an 8-byte OLE1 magic, a
//! length-prefixed description, an 8-byte reserved field, a 4-byte payload
//! size, then the payload itself. Payloads are dumped to a temp file and
//! handed to the downstream scanner; a payload opening with `D0 CF` is an
//! OLE2 compound document and is written as-is, anything else is treated
//! as an OLE10Native stream and prefixed with its little-endian length.
//!
//! Malformed streams never abort the walk: a magic mismatch is logged and
//! skipped past, and a group that closes mid-object still recovers and
//! scans whatever was dumped.

use crate::config::ExtractConfig;
use crate::error::{Result, RtfError};
use crate::hex::HexStream;
use crate::report::{ExtractReport, ObjectFlavour, ObjectRecord, Verdict};
use crate::sink::ObjectSink;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

const OBJDATA_MAGIC: [u8; 8] = [0x01, 0x05, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00];
const OLE2_MAGIC: [u8; 2] = [0xD0, 0xCF];
/// Description bytes kept; the stream is still advanced past longer ones.
const DESC_NAME_MAX: usize = 64;
const ZERO_FIELD_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    WaitMagic,
    WaitDescLen,
    WaitDesc,
    WaitZero,
    WaitDataSize,
    DumpData,
    /// Terminal sink: the rest of the frame's payload is dropped.
    DumpDiscard,
}

/// Everything the walker hands the extractor besides the bytes themselves.
pub(crate) struct ScanEnv<'a> {
    pub config: &'a ExtractConfig,
    pub tmpdir: &'a Path,
    pub sink: &'a mut dyn ObjectSink,
    pub report: &'a mut ExtractReport,
}

/// Per-frame extraction context, created the first time a bound frame
/// sees text and destroyed when the frame ends.
#[derive(Debug)]
pub(crate) struct ObjectData {
    phase: Phase,
    /// Bytes consumed within the current phase.
    bytes_read: usize,
    desc_len: usize,
    desc_name: Vec<u8>,
    description: Option<String>,
    /// Declared payload size, little-endian on the wire.
    data_len: u32,
    remaining: u32,
    written: u64,
    flavour: ObjectFlavour,
    /// Payload bytes held back until classification has seen both.
    lead: [u8; 2],
    lead_len: usize,
    hex: HexStream,
    out: Option<NamedTempFile>,
}

impl ObjectData {
    pub(crate) fn new() -> Self {
        Self {
            phase: Phase::WaitMagic,
            bytes_read: 0,
            desc_len: 0,
            desc_name: Vec::new(),
            description: None,
            data_len: 0,
            remaining: 0,
            written: 0,
            flavour: ObjectFlavour::Unknown,
            lead: [0; 2],
            lead_len: 0,
            hex: HexStream::new(),
            out: None,
        }
    }

    /// Feed one run of raw (still hex-encoded) frame text.
    pub(crate) fn process(&mut self, input: &[u8], env: &mut ScanEnv) -> Result<()> {
        if input.is_empty() {
            return Ok(());
        }
        let mut decoded = Vec::with_capacity(input.len() / 2 + 1);
        self.hex.decode_into(input, &mut decoded);
        self.consume(&decoded, env)
    }

    /// End of the frame: recover and scan whatever was dumped so far.
    pub(crate) fn finish(&mut self, env: &mut ScanEnv) -> Result<()> {
        if self.out.is_some() {
            let truncated = self.remaining > 0;
            return self.finish_object(env, truncated);
        }
        Ok(())
    }

    fn consume(&mut self, mut bytes: &[u8], env: &mut ScanEnv) -> Result<()> {
        loop {
            match self.phase {
                Phase::WaitMagic => {
                    let take = (OBJDATA_MAGIC.len() - self.bytes_read).min(bytes.len());
                    for &b in &bytes[..take] {
                        if b != OBJDATA_MAGIC[self.bytes_read] {
                            debug!(
                                "objdata magic mismatch at byte {}: expected {:#04x}, got {:#04x}",
                                self.bytes_read, OBJDATA_MAGIC[self.bytes_read], b
                            );
                        }
                        self.bytes_read += 1;
                    }
                    bytes = &bytes[take..];
                    if self.bytes_read < OBJDATA_MAGIC.len() {
                        return Ok(());
                    }
                    self.bytes_read = 0;
                    self.desc_len = 0;
                    self.phase = Phase::WaitDescLen;
                }
                Phase::WaitDescLen => {
                    let take = (4 - self.bytes_read).min(bytes.len());
                    for &b in &bytes[..take] {
                        self.desc_len |= (b as usize) << (8 * self.bytes_read);
                        self.bytes_read += 1;
                    }
                    bytes = &bytes[take..];
                    if self.bytes_read < 4 {
                        return Ok(());
                    }
                    debug!("object description length: {}", self.desc_len);
                    if self.desc_len > DESC_NAME_MAX {
                        debug!(
                            "description length {} too big, keeping the first {} bytes",
                            self.desc_len, DESC_NAME_MAX
                        );
                    }
                    self.desc_name = Vec::with_capacity(self.desc_len.min(DESC_NAME_MAX));
                    self.bytes_read = 0;
                    self.phase = Phase::WaitDesc;
                }
                Phase::WaitDesc => {
                    let keep = self.desc_len.min(DESC_NAME_MAX);
                    while self.bytes_read < keep && !bytes.is_empty() {
                        self.desc_name.push(bytes[0]);
                        self.bytes_read += 1;
                        bytes = &bytes[1..];
                    }
                    // advance past the description even beyond the kept prefix
                    if self.bytes_read < self.desc_len {
                        let skip = (self.desc_len - self.bytes_read).min(bytes.len());
                        self.bytes_read += skip;
                        bytes = &bytes[skip..];
                    }
                    if self.bytes_read < self.desc_len {
                        return Ok(());
                    }
                    let name = String::from_utf8_lossy(&self.desc_name);
                    let name = name.trim_end_matches('\0');
                    debug!("preparing to dump embedded object, description: {:?}", name);
                    self.description = (!name.is_empty()).then(|| name.to_string());
                    self.desc_name = Vec::new();
                    self.bytes_read = 0;
                    self.phase = Phase::WaitZero;
                }
                Phase::WaitZero => {
                    let take = (ZERO_FIELD_LEN - self.bytes_read).min(bytes.len());
                    self.bytes_read += take;
                    bytes = &bytes[take..];
                    if self.bytes_read < ZERO_FIELD_LEN {
                        return Ok(());
                    }
                    self.bytes_read = 0;
                    self.data_len = 0;
                    self.phase = Phase::WaitDataSize;
                }
                Phase::WaitDataSize => {
                    let take = (4 - self.bytes_read).min(bytes.len());
                    for &b in &bytes[..take] {
                        self.data_len |= u32::from(b) << (8 * self.bytes_read);
                        self.bytes_read += 1;
                    }
                    bytes = &bytes[take..];
                    if self.bytes_read < 4 {
                        return Ok(());
                    }
                    self.bytes_read = 0;
                    debug!("dumping embedded object of size {}", self.data_len);
                    if u64::from(self.data_len) > env.config.max_object_size {
                        warn!(
                            "embedded object of {} bytes exceeds the {} byte limit, skipping",
                            self.data_len, env.config.max_object_size
                        );
                        env.report.discarded += 1;
                        self.phase = Phase::DumpDiscard;
                        continue;
                    }
                    let file = tempfile::Builder::new()
                        .prefix("rtf-obj-")
                        .tempfile_in(env.tmpdir)
                        .map_err(|source| RtfError::TempFile {
                            dir: env.tmpdir.to_path_buf(),
                            source,
                        })?;
                    self.out = Some(file);
                    self.remaining = self.data_len;
                    self.written = 0;
                    self.flavour = ObjectFlavour::Unknown;
                    self.lead_len = 0;
                    self.phase = Phase::DumpData;
                }
                Phase::DumpData => {
                    if self.flavour == ObjectFlavour::Unknown {
                        let need = self.remaining.min(2) as usize;
                        while self.lead_len < need && !bytes.is_empty() {
                            self.lead[self.lead_len] = bytes[0];
                            self.lead_len += 1;
                            bytes = &bytes[1..];
                        }
                        if self.lead_len < need {
                            return Ok(());
                        }
                        self.classify()?;
                    }
                    let want = (self.remaining as usize).min(bytes.len());
                    if want > 0 {
                        self.write_out(&bytes[..want])?;
                        self.remaining -= want as u32;
                        self.written += want as u64;
                        bytes = &bytes[want..];
                    }
                    if self.remaining == 0 {
                        self.finish_object(env, false)?;
                        if env.report.objects.len() >= env.config.max_objects {
                            warn!(
                                "object limit of {} reached, discarding the rest of the group",
                                env.config.max_objects
                            );
                            self.phase = Phase::DumpDiscard;
                        } else {
                            // the same group may carry another object
                            self.bytes_read = 0;
                            self.phase = Phase::WaitMagic;
                        }
                        continue;
                    }
                    return Ok(());
                }
                Phase::DumpDiscard => return Ok(()),
            }
        }
    }

    /// Decide the payload flavour from its first byte pair and flush any
    /// held-back bytes, prefixing OLE10Native streams with their length.
    fn classify(&mut self) -> Result<()> {
        self.flavour = if self.lead_len == 2 && self.lead == OLE2_MAGIC {
            ObjectFlavour::Ole2
        } else {
            ObjectFlavour::Ole10Native
        };
        if self.flavour == ObjectFlavour::Ole10Native {
            let prefix = self.data_len.to_le_bytes();
            self.write_out(&prefix)?;
        }
        if self.lead_len > 0 {
            let lead = self.lead;
            let n = self.lead_len;
            self.write_out(&lead[..n])?;
            self.remaining -= n as u32;
            self.written += n as u64;
            self.lead_len = 0;
        }
        Ok(())
    }

    fn write_out(&mut self, buf: &[u8]) -> Result<()> {
        match self.out.as_mut() {
            Some(file) => file.write_all(buf).map_err(RtfError::Write),
            None => Ok(()),
        }
    }

    /// Hand the dumped object to the sink, then drop or keep the temp file.
    fn finish_object(&mut self, env: &mut ScanEnv, truncated: bool) -> Result<()> {
        if self.flavour == ObjectFlavour::Unknown && self.out.is_some() {
            // group ended before both lead bytes arrived
            self.classify()?;
        }
        let Some(mut tmp) = self.out.take() else {
            return Ok(());
        };
        let flavour = self.flavour;
        debug!(
            "scanning embedded object: {:?}, {} bytes, {}",
            flavour,
            self.written,
            tmp.path().display()
        );
        tmp.as_file_mut().seek(SeekFrom::Start(0))?;
        let verdict = match flavour {
            ObjectFlavour::Ole10Native => env.sink.scan_ole10_native(tmp.as_file_mut())?,
            _ => {
                let path = tmp.path().to_path_buf();
                env.sink.scan_file(tmp.as_file_mut(), &path)?
            }
        };

        let mut record = ObjectRecord {
            flavour,
            size: self.written,
            description: self.description.take(),
            path: None,
            truncated,
        };
        let path = tmp.path().to_path_buf();
        let detected = matches!(verdict, Verdict::Detected(_));
        if env.config.keep_tmp {
            match tmp.keep() {
                Ok((_, kept)) => record.path = Some(kept),
                Err(e) => debug!("failed to keep temp file {}: {}", path.display(), e),
            }
        } else if let Err(source) = tmp.close() {
            if detected {
                warn!("failed to remove temp file {}: {}", path.display(), source);
            } else {
                env.report.objects.push(record);
                return Err(RtfError::Unlink { path, source });
            }
        }
        env.report.objects.push(record);

        match verdict {
            Verdict::Detected(sig) => {
                env.report.verdict = Verdict::Detected(sig.clone());
                Err(RtfError::Detected(sig))
            }
            Verdict::Clean => Ok(()),
        }
    }
}
