// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shell-quoting and path-expansion helpers shared by every SSH
//! command construction site (spec.md §4.1.2).

/// Wraps `s` in single quotes, escaping embedded single quotes with the
/// `'\''` idiom. Tolerates dollar signs, backslashes, backticks, and
/// embedded newlines since single quotes suppress all shell expansion.
pub fn escape_for_shell(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for ch in s.chars() {
        if ch == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(ch);
        }
    }
    out.push('\'');
    out
}

/// User-expands a leading `~` or `~/x` to `$HOME` / `$HOME/x` before the
/// path is embedded in a quoted remote command — the remote shell never
/// sees the tilde, since quoting would otherwise suppress its expansion.
pub fn expand_tilde_for_remote(path: &str) -> String {
    if path == "~" {
        "$HOME".to_string()
    } else if let Some(rest) = path.strip_prefix("~/") {
        format!("$HOME/{rest}")
    } else {
        path.to_string()
    }
}

/// Double-quotes `s`, escaping backslash, double-quote, and backtick but
/// leaving `$` untouched — used for the `cd` target so a pre-substituted
/// `$HOME` still expands on the remote shell (single quotes would
/// suppress that expansion entirely).
fn quote_preserving_variables(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        if matches!(ch, '\\' | '"' | '`') {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('"');
    out
}

/// Builds the full wrapped remote command: `cd <cwd> && <env exports> &&
/// bash -c <quoted user cmd>` (spec.md §4.1.2).
pub fn wrap_remote_command(cwd: &str, env: &[(String, String)], cmd: &str) -> String {
    let cwd = expand_tilde_for_remote(cwd);
    let mut parts = vec![format!("cd {}", quote_preserving_variables(&cwd))];
    for (k, v) in env {
        parts.push(format!("export {}={}", k, escape_for_shell(v)));
    }
    parts.push(format!("bash -c {}", escape_for_shell(cmd)));
    parts.join(" && ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        plain = { "hello", "'hello'" },
        single_quote = { "it's", "'it'\\''s'" },
        dollar = { "$HOME", "'$HOME'" },
        backtick = { "`cmd`", "'`cmd`'" },
        backslash = { "a\\b", "'a\\b'" },
        newline = { "a\nb", "'a\nb'" },
    )]
    fn escape_for_shell_cases(input: &str, expected: &str) {
        assert_eq!(escape_for_shell(input), expected);
    }

    #[test]
    fn expand_tilde_handles_bare_and_subpath() {
        assert_eq!(expand_tilde_for_remote("~"), "$HOME");
        assert_eq!(expand_tilde_for_remote("~/code"), "$HOME/code");
        assert_eq!(expand_tilde_for_remote("/abs/path"), "/abs/path");
    }

    #[test]
    fn wrap_remote_command_shape() {
        let wrapped = wrap_remote_command(
            "~/code",
            &[("FOO".to_string(), "bar baz".to_string())],
            "echo hi",
        );
        assert_eq!(
            wrapped,
            "cd \"$HOME/code\" && export FOO='bar baz' && bash -c 'echo hi'"
        );
    }
}
