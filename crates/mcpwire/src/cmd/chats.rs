use mcpwire::channel::Request;

use crate::cmd::send::exchange;
use crate::cmd::{Context, DeleteAllChatsArgs};
use crate::exit::CliResult;

pub fn delete_all(args: DeleteAllChatsArgs, ctx: &Context) -> CliResult<i32> {
    let target = args.connection.target(&ctx.config.client)?;
    let token = args.connection.token(&ctx.config.client)?;
    exchange(ctx, &target, &Request::new("delete_all_chats").with_token(token))
}
