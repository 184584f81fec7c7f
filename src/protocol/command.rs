//! Command maps and side-channel frames.
//!
//! Requests and responses share one shape: a map whose empty-string key
//! holds the command name. Frames pushed by the server outside of that
//! exchange are either log lines (a `data` byte array and no command) or
//! batches of file-resend requests (`files2update`).

use std::fmt;

use super::variant::{Variant, VariantMap};

/// Reserved key holding the command name.
pub const COMMAND_KEY: &str = "";

/// Field carrying a server log line.
pub const LOG_DATA_KEY: &str = "data";

/// Field carrying a list of file-resend requests.
pub const FILES_TO_UPDATE_KEY: &str = "files2update";

/// Build a command map from a name and its parameters.
///
/// A parameter under the reserved key is replaced by the command name.
pub fn build_command(name: &str, params: VariantMap) -> VariantMap {
    let mut map = VariantMap::with_capacity(params.len() + 1);
    map.insert(COMMAND_KEY.to_string(), Variant::from(name));
    for (key, value) in params {
        if key != COMMAND_KEY {
            map.insert(key, value);
        }
    }
    map
}

/// Command name of a frame, if it carries a non-empty one.
pub fn command_name(frame: &VariantMap) -> Option<&str> {
    frame
        .get(COMMAND_KEY)
        .and_then(Variant::as_str)
        .filter(|name| !name.is_empty())
}

/// How an inbound frame relates to the command being awaited.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// The awaited response.
    Response,
    /// A server log line.
    Log(LogLine),
    /// Anything else: a stale response or an unknown push.
    Unrelated(Option<String>),
}

/// Classify a frame while waiting for `awaited`.
///
/// File-resend requests are extracted separately with [`file_requests`]
/// since they may ride on any frame, including the awaited response.
pub fn classify(frame: &VariantMap, awaited: &str) -> Inbound {
    match command_name(frame) {
        Some(name) if name == awaited => Inbound::Response,
        Some(name) => Inbound::Unrelated(Some(name.to_string())),
        None => match frame.get(LOG_DATA_KEY) {
            Some(data) => Inbound::Log(LogLine::from_variant(data)),
            None => Inbound::Unrelated(None),
        },
    }
}

// ============================================================================
// Log lines
// ============================================================================

/// Severity of a server log line.
///
/// Ordered from most to least important; `level()` is compared against the
/// session verbosity (0-3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
    Debug,
}

impl Severity {
    /// Classify by tag, first match wins. Untagged lines count as info.
    pub fn classify(text: &str) -> Self {
        if text.contains("[error]") {
            Severity::Error
        } else if text.contains("[warning]") {
            Severity::Warning
        } else if text.contains("[info]") {
            Severity::Info
        } else if text.contains("[debug]") {
            Severity::Debug
        } else {
            Severity::Info
        }
    }

    /// Minimum verbosity at which lines of this severity are shown.
    pub fn level(self) -> u8 {
        match self {
            Severity::Error => 1,
            Severity::Warning => 2,
            Severity::Info => 3,
            Severity::Debug => 4,
        }
    }

    #[inline]
    pub fn is_visible_at(self, verbosity: u8) -> bool {
        verbosity >= self.level()
    }
}

/// A log line pushed by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub text: String,
    pub severity: Severity,
}

impl LogLine {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let severity = Severity::classify(&text);
        Self { text, severity }
    }

    /// Lines arrive as UTF-8 byte arrays; strings are accepted too.
    fn from_variant(data: &Variant) -> Self {
        match data {
            Variant::ByteArray(bytes) => Self::new(String::from_utf8_lossy(bytes)),
            Variant::String(s) => Self::new(s.clone()),
            other => Self::new(other.to_string()),
        }
    }
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text.trim_end())
    }
}

// ============================================================================
// File-resend requests
// ============================================================================

/// A server request to upload a local file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRequest {
    /// Path relative to `dirname`.
    pub requested_file: String,
    /// Local directory holding the file.
    pub dirname: String,
    /// zlib level for the upload (<= 0 sends raw data).
    pub compression_level: i32,
    /// Server-side name, defaults to `requested_file`.
    pub target: Option<String>,
}

impl FileRequest {
    /// Local path of the file to upload.
    pub fn local_path(&self) -> String {
        format!("{}/{}", self.dirname, self.requested_file)
    }

    /// Name under which the server stores the upload.
    pub fn target_name(&self) -> &str {
        self.target.as_deref().unwrap_or(&self.requested_file)
    }

    fn from_map(entry: &VariantMap) -> Option<Self> {
        let requested_file = entry.get("requested_file")?.as_str()?.to_string();
        let dirname = entry.get("dirname")?.as_str()?.to_string();
        let compression_level = entry
            .get("compressionLevel")?
            .as_i64()
            .and_then(|level| i32::try_from(level).ok())?;
        let target = entry
            .get("target")
            .and_then(Variant::as_str)
            .map(str::to_string);

        Some(Self {
            requested_file,
            dirname,
            compression_level,
            target,
        })
    }
}

/// Extract file-resend requests from a frame.
///
/// Entries missing a mandatory field are skipped with a warning.
pub fn file_requests(frame: &VariantMap) -> Vec<FileRequest> {
    let Some(entries) = frame.get(FILES_TO_UPDATE_KEY).and_then(Variant::as_list) else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| {
            let request = entry.as_map().and_then(FileRequest::from_map);
            if request.is_none() {
                tracing::warn!("Ignoring malformed file request: {}", entry);
            }
            request
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn frame(entries: &[(&str, Variant)]) -> VariantMap {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_build_command_sets_reserved_key() {
        let params = frame(&[("", Variant::from("spoofed")), ("w", Variant::Int32(3))]);
        let command = build_command("setImageSize", params);

        assert_eq!(command_name(&command), Some("setImageSize"));
        assert_eq!(command.len(), 2);
        assert_eq!(command["w"], Variant::Int32(3));
    }

    #[test]
    fn test_empty_command_name_is_none() {
        let map = frame(&[("", Variant::from(""))]);
        assert_eq!(command_name(&map), None);
    }

    #[test]
    fn test_classify_response_and_unrelated() {
        let response = frame(&[("", Variant::from("render"))]);
        assert_eq!(classify(&response, "render"), Inbound::Response);
        assert_eq!(
            classify(&response, "getImage"),
            Inbound::Unrelated(Some("render".into()))
        );
        assert_eq!(classify(&VariantMap::new(), "render"), Inbound::Unrelated(None));
    }

    #[test]
    fn test_classify_log_line() {
        let log = frame(&[("data", Variant::bytes(Bytes::from_static(b"[warning] low memory\n")))]);
        match classify(&log, "render") {
            Inbound::Log(line) => {
                assert_eq!(line.severity, Severity::Warning);
                assert_eq!(line.to_string(), "[warning] low memory");
            }
            other => panic!("expected log line, got {:?}", other),
        }
    }

    #[test]
    fn test_log_with_command_tag_is_not_a_log() {
        let tagged = frame(&[
            ("", Variant::from("render")),
            ("data", Variant::bytes(Bytes::from_static(b"[error] x"))),
        ]);
        assert_eq!(classify(&tagged, "render"), Inbound::Response);
    }

    #[test]
    fn test_severity_priority() {
        assert_eq!(Severity::classify("[debug] then [error]"), Severity::Error);
        assert_eq!(Severity::classify("[info] [warning]"), Severity::Warning);
        assert_eq!(Severity::classify("[debug] trace"), Severity::Debug);
        assert_eq!(Severity::classify("plain text"), Severity::Info);
    }

    #[test]
    fn test_severity_visibility() {
        assert!(!Severity::Error.is_visible_at(0));
        assert!(Severity::Error.is_visible_at(1));
        assert!(!Severity::Warning.is_visible_at(1));
        assert!(Severity::Info.is_visible_at(3));
        assert!(!Severity::Debug.is_visible_at(3));
    }

    #[test]
    fn test_file_requests_parsing() {
        let good = frame(&[
            ("requested_file", Variant::from("meshes/a.obj")),
            ("dirname", Variant::from("/data")),
            ("compressionLevel", Variant::Int32(3)),
        ]);
        let with_target = frame(&[
            ("requested_file", Variant::from("b.png")),
            ("dirname", Variant::from(".")),
            ("compressionLevel", Variant::Int32(-1)),
            ("target", Variant::from("textures/b.png")),
        ]);
        let missing_dir = frame(&[
            ("requested_file", Variant::from("c")),
            ("compressionLevel", Variant::Int32(0)),
        ]);
        let batch = frame(&[(
            "files2update",
            Variant::List(vec![
                Variant::Map(good),
                Variant::Map(missing_dir),
                Variant::Map(with_target),
                Variant::from("junk"),
            ]),
        )]);

        let requests = file_requests(&batch);

        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].local_path(), "/data/meshes/a.obj");
        assert_eq!(requests[0].target_name(), "meshes/a.obj");
        assert_eq!(requests[0].compression_level, 3);
        assert_eq!(requests[1].target_name(), "textures/b.png");
        assert!(file_requests(&VariantMap::new()).is_empty());
    }
}
