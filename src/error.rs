pub use masterror::{AppError, AppResult};

/// Create file read error
pub fn file_read_error(path: &str, source: std::io::Error) -> AppError {
    AppError::internal(format!("Failed to read file '{}': {}", path, source))
}

/// Create metadata decode error with optional position info
pub fn metadata_parse_error(message: impl Into<String>) -> AppError {
    let msg = message.into();
    AppError::bad_request(format_located_error("Metadata parse error", &msg))
}

/// Create corpus decode error with optional position info
pub fn corpus_parse_error(message: impl Into<String>) -> AppError {
    let msg = message.into();
    AppError::bad_request(format_located_error("Query corpus parse error", &msg))
}

/// Create config error
pub fn config_error(message: impl Into<String>) -> AppError {
    AppError::bad_request(message.into())
}

/// Format decode error with position highlighting
fn format_located_error(prefix: &str, message: &str) -> String {
    // sqlparser reports "... at Line: X, Column Y"; serde decoders report
    // "... at line X column Y"
    if let Some(pos) = extract_position(message) {
        format!(
            "{} at line {}, column {}:\n  {}",
            prefix, pos.line, pos.column, message
        )
    } else {
        format!("{}:\n  {}", prefix, message)
    }
}

struct SourcePosition {
    line:   usize,
    column: usize
}

fn extract_position(message: &str) -> Option<SourcePosition> {
    let markers = [("Line: ", ", Column "), ("line ", " column ")];
    for (line_marker, col_marker) in markers {
        let Some(line_start) = message.find(line_marker) else {
            continue;
        };
        let line_num_start = line_start + line_marker.len();
        let Some(col_start) = message[line_num_start..].find(col_marker) else {
            continue;
        };
        let line_str = &message[line_num_start..line_num_start + col_start];
        let col_num_start = line_num_start + col_start + col_marker.len();
        let col_end = message[col_num_start..]
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(message.len() - col_num_start);
        let col_str = &message[col_num_start..col_num_start + col_end];
        if let (Ok(line), Ok(column)) = (line_str.parse(), col_str.parse()) {
            return Some(SourcePosition { line, column });
        }
    }
    None
}
