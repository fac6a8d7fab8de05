//! The streaming RTF walker.
//!
//! A byte-at-a-time tokenizer over `{`, `}`, `\controlword` and plain text,
//! driving the group stack and dispatching recognised control words. The
//! walker never builds a document tree and never fails on malformed RTF:
//! anything it cannot make sense of is logged and skipped past. Its only
//! job is to find `\objdata` payloads inside `\object` groups and hand the
//! decoded objects to the configured sink.

use crate::actions::{find_action, Action};
use crate::config::ExtractConfig;
use crate::error::{Result, RtfError};
use crate::file_io;
use crate::objdata::{ObjectData, ScanEnv};
use crate::report::ExtractReport;
use crate::sink::ObjectSink;
use crate::state::{Frame, GroupStack, Handler, ParseState, CONTROL_WORD_MAX};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// Input is fed to the tokenizer in chunks of this size; any split is valid.
const CHUNK_SIZE: usize = 8192;

/// Embedded-object extractor for RTF documents.
pub struct RtfExtractor {
    config: ExtractConfig,
}

impl RtfExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: ExtractConfig::default(),
        }
    }

    pub fn with_config(config: ExtractConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Walk an in-memory document, handing every embedded object to `sink`.
    pub fn extract(&self, data: &[u8], sink: &mut dyn ObjectSink) -> Result<ExtractReport> {
        let mut session = Session::new(&self.config, sink)?;
        let mut walk = Ok(());
        for chunk in data.chunks(CHUNK_SIZE) {
            if let Err(e) = session.feed(chunk) {
                walk = Err(e);
                break;
            }
        }
        session.close(walk)
    }

    /// Walk a document on disk, memory-mapping large files.
    pub fn extract_file(&self, path: &Path, sink: &mut dyn ObjectSink) -> Result<ExtractReport> {
        let data = file_io::read_file_smart(path)?;
        self.extract(data.as_slice(), sink)
    }
}

impl Default for RtfExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// One document walk: working frame, group stack, temp directory, report.
struct Session<'a> {
    config: &'a ExtractConfig,
    sink: &'a mut dyn ObjectSink,
    tmpdir: Option<TempDir>,
    tmp_path: PathBuf,
    frame: Frame,
    stack: GroupStack,
    report: ExtractReport,
}

impl<'a> Session<'a> {
    fn new(config: &'a ExtractConfig, sink: &'a mut dyn ObjectSink) -> Result<Self> {
        let root = config.tmp_root.clone().unwrap_or_else(std::env::temp_dir);
        let tmpdir = tempfile::Builder::new()
            .prefix("rtfcarve-")
            .tempdir_in(&root)
            .map_err(|source| RtfError::TempDir { root, source })?;
        let tmp_path = tmpdir.path().to_path_buf();
        debug!("extracting embedded objects under {}", tmp_path.display());
        Ok(Self {
            config,
            sink,
            tmpdir: Some(tmpdir),
            tmp_path,
            frame: Frame::base(),
            stack: GroupStack::new(),
            report: ExtractReport::new(),
        })
    }

    /// Feed one chunk of the document through the tokenizer.
    fn feed(&mut self, chunk: &[u8]) -> Result<()> {
        let mut i = 0;
        while i < chunk.len() {
            match self.frame.parse {
                ParseState::Main => match chunk[i] {
                    b'{' => {
                        i += 1;
                        self.open_group();
                    }
                    b'}' => {
                        i += 1;
                        self.close_group()?;
                    }
                    b'\\' => {
                        i += 1;
                        self.frame.parse = ParseState::Control;
                    }
                    _ => {
                        let end = chunk[i..]
                            .iter()
                            .position(|&b| matches!(b, b'{' | b'}' | b'\\'))
                            .map_or(chunk.len(), |p| i + p);
                        self.deliver(&chunk[i..end])?;
                        i = end;
                    }
                },
                ParseState::Control => {
                    if chunk[i].is_ascii_alphabetic() {
                        self.frame.parse = ParseState::ControlWord;
                        self.frame.word_len = 0;
                    } else {
                        self.frame.parse = ParseState::ControlSymbol;
                    }
                }
                ParseState::ControlSymbol => {
                    // control symbols carry no meaning here
                    i += 1;
                    self.frame.parse = ParseState::Main;
                }
                ParseState::ControlWord => {
                    let b = chunk[i];
                    if self.frame.word_len == CONTROL_WORD_MAX {
                        debug!(
                            "control word exceeds maximum length: {}",
                            String::from_utf8_lossy(self.frame.word())
                        );
                        // leave the byte for Main so braces still balance
                        self.frame.parse = ParseState::Main;
                    } else if b.is_ascii_alphabetic() {
                        self.frame.word[self.frame.word_len] = b;
                        self.frame.word_len += 1;
                        i += 1;
                    } else if is_rtf_space(b) {
                        // the terminator becomes part of the lookup key
                        self.frame.word[self.frame.word_len] = b;
                        self.frame.word_len += 1;
                        i += 1;
                        self.frame.parse = ParseState::InterpretControlWord;
                    } else if b.is_ascii_digit() {
                        self.frame.parse = ParseState::ControlWordParam;
                        self.frame.param = 0;
                        self.frame.param_sign = 1;
                    } else if b == b'-' {
                        i += 1;
                        self.frame.parse = ParseState::ControlWordParam;
                        self.frame.param = 0;
                        self.frame.param_sign = -1;
                    } else {
                        self.frame.parse = ParseState::InterpretControlWord;
                    }
                }
                ParseState::ControlWordParam => {
                    let b = chunk[i];
                    if b.is_ascii_digit() {
                        let digit = i64::from(b - b'0');
                        match self
                            .frame
                            .param
                            .checked_mul(10)
                            .and_then(|p| p.checked_add(digit))
                        {
                            Some(value) => {
                                self.frame.param = value;
                                i += 1;
                            }
                            None => {
                                debug!("control word parameter overflows a 64-bit integer");
                                self.frame.parse = ParseState::Main;
                            }
                        }
                    } else if b.is_ascii_alphabetic() {
                        i += 1;
                    } else {
                        if self.frame.param_sign < 0 {
                            self.frame.param = -self.frame.param;
                        }
                        self.frame.parse = ParseState::InterpretControlWord;
                    }
                }
                ParseState::InterpretControlWord => {
                    self.interpret()?;
                    self.frame.parse = ParseState::Main;
                }
            }
        }
        Ok(())
    }

    fn open_group(&mut self) {
        self.stack.push(&mut self.frame);
        self.report.groups += 1;
        self.report.max_depth = self.report.max_depth.max(self.stack.depth());
    }

    fn close_group(&mut self) -> Result<()> {
        self.end_active()?;
        self.stack.pop(&mut self.frame);
        Ok(())
    }

    /// Dispatch a completed control word.
    fn interpret(&mut self) -> Result<()> {
        let Some(action) = find_action(self.frame.word()) else {
            return Ok(());
        };
        if let Handler::Objdata(Some(_)) = self.frame.handler {
            // a recognised control word ends the previous extraction
            self.end_active()?;
            self.frame.handler = Handler::None;
        }
        match action {
            Action::Object => self.frame.seen.insert(Action::Object),
            Action::ObjectData => {
                if self.frame.seen.contains(Action::Object) {
                    if self.report.objects.len() >= self.config.max_objects {
                        warn!(
                            "object limit of {} reached, ignoring further \\objdata groups",
                            self.config.max_objects
                        );
                    } else {
                        self.frame.handler = Handler::Objdata(None);
                    }
                }
            }
        }
        Ok(())
    }

    /// Hand a run of plain text to the frame's extractor, if one is bound.
    fn deliver(&mut self, run: &[u8]) -> Result<()> {
        let res = {
            let config = self.config;
            let tmp_path = self.tmp_path.as_path();
            let sink: &mut dyn ObjectSink = &mut *self.sink;
            let report = &mut self.report;
            match &mut self.frame.handler {
                Handler::Objdata(slot) => {
                    let ctx = slot.get_or_insert_with(|| Box::new(ObjectData::new()));
                    let mut env = ScanEnv {
                        config,
                        tmpdir: tmp_path,
                        sink,
                        report,
                    };
                    ctx.process(run, &mut env)
                }
                Handler::None => Ok(()),
            }
        };
        if res.is_err() {
            // recover whatever was extracted before propagating
            let _ = self.end_active();
        }
        res
    }

    /// Finalise the working frame's extractor, scanning anything dumped.
    fn end_active(&mut self) -> Result<()> {
        let config = self.config;
        let tmp_path = self.tmp_path.as_path();
        let sink: &mut dyn ObjectSink = &mut *self.sink;
        let report = &mut self.report;
        if let Handler::Objdata(slot) = &mut self.frame.handler {
            if let Some(mut ctx) = slot.take() {
                let mut env = ScanEnv {
                    config,
                    tmpdir: tmp_path,
                    sink,
                    report,
                };
                return ctx.finish(&mut env);
            }
        }
        Ok(())
    }

    /// Finalise a frame drained off the stack during cleanup.
    fn end_frame(&mut self, mut frame: Frame) -> Result<()> {
        if let Handler::Objdata(Some(mut ctx)) =
            std::mem::replace(&mut frame.handler, Handler::None)
        {
            let mut env = ScanEnv {
                config: self.config,
                tmpdir: self.tmp_path.as_path(),
                sink: &mut *self.sink,
                report: &mut self.report,
            };
            return ctx.finish(&mut env);
        }
        Ok(())
    }

    /// Run every exit path: end live extractors, drain the stack, remove
    /// (or keep) the temp directory, and resolve the final outcome.
    fn close(mut self, walk: Result<()>) -> Result<ExtractReport> {
        let mut outcome = walk;

        let end = self.end_active();
        if outcome.is_ok() {
            outcome = end;
        }
        while let Some(frame) = self.stack.pop_stored() {
            let end = self.end_frame(frame);
            if outcome.is_ok() {
                outcome = end;
            }
        }

        if let Some(dir) = self.tmpdir.take() {
            if self.config.keep_tmp {
                self.report.tmp_dir = Some(dir.into_path());
            } else if let Err(e) = dir.close() {
                debug!(
                    "failed to remove temp directory {}: {}",
                    self.tmp_path.display(),
                    e
                );
            }
        }

        match outcome {
            Ok(()) => Ok(self.report),
            // the verdict is already on the report
            Err(RtfError::Detected(_)) => Ok(self.report),
            Err(e) => Err(e),
        }
    }
}

/// The terminator set the tokenizer treats as control-word whitespace.
fn is_rtf_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\x0b' | b'\x0c' | b'\r')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{ObjectFlavour, Verdict};
    use crate::sink::CollectSink;

    fn run(input: &[u8]) -> (ExtractReport, CollectSink) {
        run_chunks(&[input])
    }

    fn run_chunks(chunks: &[&[u8]]) -> (ExtractReport, CollectSink) {
        run_with_config(ExtractConfig::default(), chunks)
    }

    fn run_with_config(
        config: ExtractConfig,
        chunks: &[&[u8]],
    ) -> (ExtractReport, CollectSink) {
        let mut sink = CollectSink::new();
        let report = {
            let mut session = Session::new(&config, &mut sink).unwrap();
            let mut walk = Ok(());
            for chunk in chunks {
                if let Err(e) = session.feed(chunk) {
                    walk = Err(e);
                    break;
                }
            }
            session.close(walk).unwrap()
        };
        (report, sink)
    }

    const OBJ_HEADER: &str = "010500000200000004000000746573740000000000000000";

    fn object_group(payload_hex: &str, payload_len: u32) -> String {
        let size = hex::encode(payload_len.to_le_bytes());
        format!("{{\\object\\objdata {OBJ_HEADER}{size}{payload_hex}}}")
    }

    #[test]
    fn test_plain_document_is_clean() {
        let (report, sink) = run(b"{\\rtf1 hello}");
        assert_eq!(report.verdict, Verdict::Clean);
        assert!(report.objects.is_empty());
        assert!(sink.objects.is_empty());
        assert_eq!(report.groups, 1);
        assert_eq!(report.max_depth, 1);
    }

    #[test]
    fn test_non_rtf_input_is_clean() {
        let (report, sink) = run(b"MZ\x90\x00 this is not rtf at all \x01\x02");
        assert_eq!(report.verdict, Verdict::Clean);
        assert!(sink.objects.is_empty());
    }

    #[test]
    fn test_ole2_object_is_extracted() {
        let doc = format!("{{\\rtf1{}}}", object_group("d0cf", 2));
        let (report, sink) = run(doc.as_bytes());
        assert_eq!(report.objects.len(), 1);
        assert_eq!(report.objects[0].flavour, ObjectFlavour::Ole2);
        assert_eq!(report.objects[0].description.as_deref(), Some("test"));
        assert!(!sink.objects[0].ole10_native);
        assert_eq!(sink.objects[0].data, vec![0xD0, 0xCF]);
    }

    #[test]
    fn test_ole10_native_object_gets_prefix() {
        let doc = format!("{{\\rtf1{}}}", object_group("4142", 2));
        let (report, sink) = run(doc.as_bytes());
        assert_eq!(report.objects.len(), 1);
        assert_eq!(report.objects[0].flavour, ObjectFlavour::Ole10Native);
        assert!(sink.objects[0].ole10_native);
        assert_eq!(sink.objects[0].data, vec![0x02, 0x00, 0x00, 0x00, 0x41, 0x42]);
    }

    #[test]
    fn test_objdata_without_object_ancestor_is_ignored() {
        let doc = format!("{{\\objdata {OBJ_HEADER}020000004142}}");
        let (report, sink) = run(doc.as_bytes());
        assert_eq!(report.verdict, Verdict::Clean);
        assert!(report.objects.is_empty());
        assert!(sink.objects.is_empty());
    }

    #[test]
    fn test_objdata_with_only_garbage_is_clean() {
        let (report, sink) = run(b"{\\object\\objdata ZZZZ}");
        assert_eq!(report.verdict, Verdict::Clean);
        assert!(report.objects.is_empty());
        assert!(sink.objects.is_empty());
    }

    #[test]
    fn test_chunk_split_mid_byte() {
        let doc = format!("{{\\rtf1{}}}", object_group("d0cf", 2));
        let bytes = doc.as_bytes();
        // split inside the hex of the magic, 7 digits then the rest
        let split = doc.find("0105000002").unwrap() + 7;
        let (report, sink) = run_chunks(&[&bytes[..split], &bytes[split..]]);
        assert_eq!(report.objects.len(), 1);
        assert_eq!(sink.objects[0].data, vec![0xD0, 0xCF]);
    }

    #[test]
    fn test_every_chunk_split_extracts_the_same_object() {
        let doc = format!("{{\\rtf1{}}}", object_group("d0cf11e0", 4));
        let bytes = doc.as_bytes();
        for split in 0..bytes.len() {
            let (report, sink) = run_chunks(&[&bytes[..split], &bytes[split..]]);
            assert_eq!(report.objects.len(), 1, "split at {split}");
            assert_eq!(sink.objects[0].data, vec![0xD0, 0xCF, 0x11, 0xE0]);
        }
    }

    #[test]
    fn test_two_objects_in_one_group_restart() {
        let size = hex::encode(2u32.to_le_bytes());
        let doc = format!(
            "{{\\rtf1{{\\object\\objdata {OBJ_HEADER}{size}d0cf{OBJ_HEADER}{size}4142}}}}"
        );
        let (report, sink) = run(doc.as_bytes());
        assert_eq!(report.objects.len(), 2);
        assert_eq!(report.objects[0].flavour, ObjectFlavour::Ole2);
        assert_eq!(report.objects[1].flavour, ObjectFlavour::Ole10Native);
        assert_eq!(sink.objects[1].data, vec![0x02, 0x00, 0x00, 0x00, 0x41, 0x42]);
    }

    #[test]
    fn test_nested_group_does_not_feed_the_extractor() {
        // hex that would corrupt the stream if the nested group leaked into it
        let doc = format!(
            "{{\\rtf1{{\\object\\objdata {OBJ_HEADER}{{\\i aabb}}020000004142}}}}"
        );
        let (report, sink) = run(doc.as_bytes());
        assert_eq!(report.objects.len(), 1);
        assert_eq!(sink.objects[0].data, vec![0x02, 0x00, 0x00, 0x00, 0x41, 0x42]);
    }

    #[test]
    fn test_second_objdata_restarts_extraction() {
        // the first \objdata is cut short by a sibling \objdata control word
        let size = hex::encode(2u32.to_le_bytes());
        let doc = format!(
            "{{\\rtf1{{\\object\\objdata {OBJ_HEADER}{size}41\\objdata {OBJ_HEADER}{size}d0cf}}}}"
        );
        let (report, _sink) = run(doc.as_bytes());
        assert_eq!(report.objects.len(), 2);
        assert!(report.objects[0].truncated);
        assert_eq!(report.objects[0].flavour, ObjectFlavour::Ole10Native);
        assert!(!report.objects[1].truncated);
        assert_eq!(report.objects[1].flavour, ObjectFlavour::Ole2);
    }

    #[test]
    fn test_unclosed_group_is_recovered_at_end_of_input() {
        let size = hex::encode(2u32.to_le_bytes());
        let doc = format!("{{\\rtf1{{\\object\\objdata {OBJ_HEADER}{size}4142");
        let (report, sink) = run(doc.as_bytes());
        assert_eq!(report.objects.len(), 1);
        assert_eq!(sink.objects[0].data, vec![0x02, 0x00, 0x00, 0x00, 0x41, 0x42]);
    }

    #[test]
    fn test_huge_parameter_does_not_abort_the_walk() {
        let doc = format!(
            "{{\\rtf1\\b12345678901234567890123456789012 {}}}",
            object_group("d0cf", 2)
        );
        let (report, _sink) = run(doc.as_bytes());
        assert_eq!(report.verdict, Verdict::Clean);
        assert_eq!(report.objects.len(), 1);
    }

    #[test]
    fn test_overlong_control_word_is_recovered() {
        let word = "a".repeat(80);
        let doc = format!("{{\\rtf1\\{word} {}}}", object_group("4142", 2));
        let (report, _sink) = run(doc.as_bytes());
        assert_eq!(report.objects.len(), 1);
    }

    #[test]
    fn test_unbalanced_closes_are_tolerated() {
        let (report, _sink) = run(b"}}}{\\rtf1 x}}}");
        assert_eq!(report.verdict, Verdict::Clean);
    }

    #[test]
    fn test_deep_default_nesting_stays_compressed() {
        let mut doc = String::from("{\\rtf1");
        doc.push_str(&"{".repeat(5000));
        doc.push_str(&"}".repeat(5000));
        doc.push('}');
        let (report, _sink) = run(doc.as_bytes());
        assert_eq!(report.max_depth, 5001);
        assert_eq!(report.verdict, Verdict::Clean);
    }

    #[test]
    fn test_detection_surfaces_in_the_report() {
        struct DetectSink;
        impl ObjectSink for DetectSink {
            fn scan_ole10_native(
                &mut self,
                _file: &mut std::fs::File,
            ) -> Result<Verdict> {
                Ok(Verdict::Detected("Rtf.Test.Embedded".into()))
            }
            fn scan_file(
                &mut self,
                _file: &mut std::fs::File,
                _path: &std::path::Path,
            ) -> Result<Verdict> {
                Ok(Verdict::Detected("Rtf.Test.Embedded".into()))
            }
        }
        let doc = format!("{{\\rtf1{}}}", object_group("4142", 2));
        let config = ExtractConfig::default();
        let mut sink = DetectSink;
        let report = {
            let mut session = Session::new(&config, &mut sink).unwrap();
            let walk = session.feed(doc.as_bytes());
            session.close(walk).unwrap()
        };
        assert_eq!(report.verdict, Verdict::Detected("Rtf.Test.Embedded".into()));
        assert_eq!(report.objects.len(), 1);
    }
}
