use std::path::PathBuf;

use mcpwire::cred::{load_private_key_with, load_public_key, KeyFileOptions};

use crate::cmd::{Context, DecryptPasswordArgs, EncryptPasswordArgs};
use crate::exit::{credential_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::print_text;
use crate::prompt::secret_or_prompt;

/// Produce the ciphertext to put in a config file or pass to
/// `login --password-is-ciphertext`.
pub fn encrypt(args: EncryptPasswordArgs, ctx: &Context) -> CliResult<i32> {
    let path = key_path(args.public_key, &ctx.config.server.public_key, "--public-key")?;
    let key = load_public_key(&path)
        .map_err(|err| credential_error("failed to load public key", err))?;
    let password = secret_or_prompt(args.password, "--password", "Password")?;

    let ciphertext = key
        .encrypt_with(&password)
        .map_err(|err| credential_error("encryption failed", err))?;
    print_text("ciphertext", &ciphertext, ctx.format);
    Ok(SUCCESS)
}

pub fn decrypt(args: DecryptPasswordArgs, ctx: &Context) -> CliResult<i32> {
    let path = key_path(args.private_key, &ctx.config.server.private_key, "--private-key")?;
    let options = KeyFileOptions {
        allow_insecure_permissions: args.allow_insecure_key,
    };
    let key = load_private_key_with(&path, &options)
        .map_err(|err| credential_error("failed to load private key", err))?;
    let ciphertext = secret_or_prompt(args.ciphertext, "--ciphertext", "Ciphertext")?;

    let password = key
        .decrypt_with(ciphertext.trim())
        .map_err(|err| credential_error("decryption failed", err))?;
    print_text("password", &password, ctx.format);
    Ok(SUCCESS)
}

fn key_path(
    flag: Option<PathBuf>,
    configured: &Option<PathBuf>,
    flag_name: &str,
) -> CliResult<PathBuf> {
    flag.or_else(|| configured.clone()).ok_or_else(|| {
        CliError::new(
            USAGE,
            format!("no key given: pass {flag_name} or set it in the config file"),
        )
    })
}
