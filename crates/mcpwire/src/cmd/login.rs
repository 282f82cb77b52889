use std::path::Path;

use mcpwire::channel::{Request, PASSWORD_ARGUMENT};
use mcpwire::cred::{load_public_key, seal_password, Credential, CredentialMode, PublicKey};
use tracing::debug;

use crate::cmd::send::exchange;
use crate::cmd::{Context, LoginArgs};
use crate::exit::{credential_error, CliResult};
use crate::prompt::{secret_or_prompt, value_or_prompt};

pub fn run(args: LoginArgs, ctx: &Context) -> CliResult<i32> {
    let target = args.connection.target(&ctx.config.client)?;
    let email = value_or_prompt(args.email, "--email", "Email")?;
    let password = secret_or_prompt(args.password, "--password", "Password")?;

    let mode = CredentialMode::from_flag(
        args.encrypt_password || ctx.config.server.pw_encryption.unwrap_or(false),
    );
    let credential = if args.password_is_ciphertext {
        Credential::Ciphertext(password)
    } else {
        let key_path = args
            .public_key
            .as_deref()
            .or(ctx.config.server.public_key.as_deref());
        let key = match (mode, key_path) {
            (CredentialMode::Encrypted, Some(path)) => Some(load_key(path)?),
            _ => None,
        };
        seal_password(mode, &password, key.as_ref())
            .map_err(|err| credential_error("password encryption failed", err))?
    };
    debug!(?mode, ?credential, "prepared login credential");

    // Login predates the session, so a token is only sent when one was given.
    let request = login_request(email, credential, args.connection.token);
    exchange(ctx, &target, &request)
}

fn load_key(path: &Path) -> CliResult<PublicKey> {
    load_public_key(path).map_err(|err| credential_error("failed to load public key", err))
}

fn login_request(email: String, credential: Credential, token: Option<String>) -> Request {
    Request::new("login")
        .with_optional_token(token)
        .with_argument("email", email)
        .with_argument(PASSWORD_ARGUMENT, credential.into_string())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn login_wire_shape() {
        let request = login_request(
            "a@example.com".to_string(),
            Credential::Ciphertext("QUJD".to_string()),
            None,
        );
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "command": "login",
                "token": null,
                "arguments": {"email": "a@example.com", "password": "QUJD"}
            })
        );
        assert_eq!(request.password(), Some("QUJD"));
    }
}
