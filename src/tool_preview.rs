use serde_json::Value;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

pub const DEFAULT_PREVIEW_LINES: usize = 8;

/// Characters and lines of a block of text.
pub fn content_stats(content: &str) -> (usize, usize) {
    let chars = content.chars().count();
    let lines = if content.is_empty() {
        0
    } else {
        content.lines().count()
    };
    (chars, lines)
}

/// Cuts `text` to at most `max_width` display columns, marking the cut.
pub fn truncate_to_width(text: &str, max_width: usize) -> String {
    if text.width() <= max_width {
        return text.to_string();
    }
    let budget = max_width.saturating_sub(1);
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let width = ch.width().unwrap_or(0);
        if used + width > budget {
            break;
        }
        used += width;
        out.push(ch);
    }
    out.push('…');
    out
}

pub fn preview_lines(marker: Option<char>, text: &str, max_lines: usize, indent: &str) -> String {
    if text.is_empty() {
        return format!("{indent}<empty>\n");
    }

    let mut out = String::new();
    let lines: Vec<&str> = text.lines().collect();
    for line in lines.iter().take(max_lines) {
        match marker {
            Some(marker) => out.push_str(&format!("{indent}{marker} {line}\n")),
            None => out.push_str(&format!("{indent}{line}\n")),
        }
    }
    if lines.len() > max_lines {
        out.push_str(&format!(
            "{indent}... ({} more lines)\n",
            lines.len() - max_lines
        ));
    }
    out
}

fn str_arg<'a>(arguments: &'a Value, key: &str) -> &'a str {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or("<missing>")
}

/// Human-readable summary of a tool call's arguments for the approval prompt.
pub fn preview_tool_call(tool_name: &str, arguments: &Value, max_lines: usize) -> String {
    match tool_name {
        "bash" => format!("$ {}\n", str_arg(arguments, "command")),
        "file_read" => format!("path: {}\n", str_arg(arguments, "path")),
        "file_write" => {
            let content = arguments
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or("");
            let (chars, lines) = content_stats(content);
            let mut out = format!("path: {}\n", str_arg(arguments, "path"));
            out.push_str(&format!("content: {chars} chars, {lines} lines\n"));
            out.push_str(&preview_lines(Some('+'), content, max_lines, "  "));
            out
        }
        "file_edit" => {
            let old = arguments
                .get("old_string")
                .and_then(Value::as_str)
                .unwrap_or("");
            let new = arguments
                .get("new_string")
                .and_then(Value::as_str)
                .unwrap_or("");
            let mut out = format!("path: {}\n", str_arg(arguments, "path"));
            out.push_str(&preview_lines(Some('-'), old, max_lines, "  "));
            out.push_str(&preview_lines(Some('+'), new, max_lines, "  "));
            out
        }
        _ => {
            if arguments.as_object().is_some_and(|obj| obj.is_empty()) || arguments.is_null() {
                "(no arguments)\n".to_string()
            } else {
                let pretty = serde_json::to_string_pretty(arguments)
                    .unwrap_or_else(|_| arguments.to_string());
                preview_lines(None, &pretty, max_lines, "")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_preview_lines_caps_long_text() {
        assert_eq!(preview_lines(Some('+'), "", 10, "  "), "  <empty>\n");
        assert_eq!(
            preview_lines(None, "a\nb\nc", 2, "  "),
            "  a\n  b\n  ... (1 more lines)\n"
        );
    }

    #[test]
    fn test_known_tools_get_compact_previews() {
        assert_eq!(
            preview_tool_call("bash", &json!({"command": "ls -la"}), 8),
            "$ ls -la\n"
        );
        let write = preview_tool_call(
            "file_write",
            &json!({"path": "a.txt", "content": "one\ntwo"}),
            8,
        );
        assert!(write.starts_with("path: a.txt\ncontent: 7 chars, 2 lines\n"));
        assert!(write.contains("  + two\n"));

        let edit = preview_tool_call(
            "file_edit",
            &json!({"path": "b.rs", "old_string": "x", "new_string": "y"}),
            8,
        );
        assert_eq!(edit, "path: b.rs\n  - x\n  + y\n");
    }

    #[test]
    fn test_unknown_tool_falls_back_to_json() {
        assert_eq!(preview_tool_call("mcp_tool", &json!({}), 8), "(no arguments)\n");
        let preview = preview_tool_call("mcp_tool", &json!({"q": "rust"}), 8);
        assert!(preview.contains("\"q\": \"rust\""));
    }

    #[test]
    fn test_truncate_to_width_counts_display_columns() {
        assert_eq!(truncate_to_width("short", 10), "short");
        assert_eq!(truncate_to_width("abcdefgh", 5), "abcd…");
        assert_eq!(truncate_to_width("日本語テキスト", 7), "日本語…");
    }
}
