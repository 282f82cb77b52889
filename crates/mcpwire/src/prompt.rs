//! Interactive fallback for values not given on the command line.
//!
//! Prompts never touch stdout, so it stays machine-readable. Plain values are
//! read one line at a time from stdin and echoed by the terminal. Secrets go
//! through rpassword, which reads from the terminal with echo switched off.

use std::io::{self, BufRead, IsTerminal, Write};

use crate::exit::{io_error, CliError, CliResult};

/// Return `value` if present, otherwise ask for it on the terminal.
///
/// Without a terminal on stdin the missing value is a usage error naming
/// `flag`.
pub fn value_or_prompt(value: Option<String>, flag: &str, label: &str) -> CliResult<String> {
    if let Some(value) = value {
        return Ok(value);
    }
    let stdin = io::stdin();
    if !stdin.is_terminal() {
        return Err(missing(flag));
    }
    prompt_line(&mut stdin.lock(), &mut io::stderr(), flag, label)
}

/// Like [`value_or_prompt`], but the typed value is not echoed.
pub fn secret_or_prompt(value: Option<String>, flag: &str, label: &str) -> CliResult<String> {
    if let Some(value) = value {
        return Ok(value);
    }
    if !io::stdin().is_terminal() {
        return Err(missing(flag));
    }
    let secret = rpassword::prompt_password(format!("{label}: "));
    non_empty_secret(secret, flag)
}

fn non_empty_secret(secret: io::Result<String>, flag: &str) -> CliResult<String> {
    match secret {
        Ok(secret) if secret.is_empty() => Err(missing(flag)),
        Ok(secret) => Ok(secret),
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Err(missing(flag)),
        Err(err) => Err(io_error("failed to read input", err)),
    }
}

fn prompt_line<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    flag: &str,
    label: &str,
) -> CliResult<String> {
    write!(output, "{label}: ")
        .and_then(|()| output.flush())
        .map_err(|err| io_error("failed to write prompt", err))?;

    let mut line = String::new();
    let read = input
        .read_line(&mut line)
        .map_err(|err| io_error("failed to read input", err))?;
    if read == 0 {
        return Err(missing(flag));
    }

    let value = line.trim_end_matches(['\r', '\n']).to_string();
    if value.is_empty() {
        return Err(missing(flag));
    }
    Ok(value)
}

fn missing(flag: &str) -> CliError {
    CliError::usage(format!("missing required value: {flag}"))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::exit::USAGE;

    #[test]
    fn given_value_skips_prompt() {
        let value = value_or_prompt(Some("x".to_string()), "--token", "Token").unwrap();
        assert_eq!(value, "x");
    }

    #[test]
    fn reads_one_line() {
        let mut input = Cursor::new("alice@example.com\r\nrest\n");
        let mut output = Vec::new();
        let value = prompt_line(&mut input, &mut output, "--email", "Email").unwrap();
        assert_eq!(value, "alice@example.com");
        assert_eq!(output, b"Email: ");
    }

    #[test]
    fn keeps_inner_whitespace() {
        let mut input = Cursor::new("  pass word \n");
        let value = prompt_line(&mut input, &mut Vec::new(), "--password", "Password").unwrap();
        assert_eq!(value, "  pass word ");
    }

    #[test]
    fn given_secret_skips_prompt() {
        let value = secret_or_prompt(Some("s3cret".to_string()), "--password", "Password");
        assert_eq!(value.unwrap(), "s3cret");
    }

    #[test]
    fn secret_read_without_echo() {
        let mut input = Cursor::new("hunter2\n");
        let mut output = Vec::new();
        let secret =
            rpassword::prompt_password_from_bufread(&mut input, &mut output, "Password: ");
        assert_eq!(non_empty_secret(secret, "--password").unwrap(), "hunter2");
        assert_eq!(output, b"Password: ");
    }

    #[test]
    fn empty_or_missing_secret_is_usage_error() {
        for raw in ["", "\n"] {
            let secret = rpassword::read_password_from_bufread(&mut Cursor::new(raw));
            let err = non_empty_secret(secret, "--ciphertext").unwrap_err();
            assert_eq!(err.code, USAGE);
            assert!(err.message.contains("--ciphertext"));
        }
    }

    #[test]
    fn secret_read_failure_is_reported() {
        let err = non_empty_secret(
            Err(io::Error::from(io::ErrorKind::PermissionDenied)),
            "--password",
        )
        .unwrap_err();
        assert_ne!(err.code, USAGE);
    }

    #[test]
    fn empty_input_is_usage_error() {
        for raw in ["", "\n"] {
            let err = prompt_line(&mut Cursor::new(raw), &mut Vec::new(), "--token", "Token")
                .unwrap_err();
            assert_eq!(err.code, USAGE);
            assert!(err.message.contains("--token"));
        }
    }
}
