use mcpwire::channel::Request;

use crate::cmd::send::exchange;
use crate::cmd::{Context, DeleteGroupArgs, ListGroupsArgs};
use crate::exit::CliResult;
use crate::prompt::value_or_prompt;

pub fn list(args: ListGroupsArgs, ctx: &Context) -> CliResult<i32> {
    let target = args.connection.target(&ctx.config.client)?;
    let token = args.connection.token(&ctx.config.client)?;
    exchange(ctx, &target, &list_groups_request(token))
}

pub fn delete(args: DeleteGroupArgs, ctx: &Context) -> CliResult<i32> {
    let target = args.connection.target(&ctx.config.client)?;
    let token = args.connection.token(&ctx.config.client)?;
    let group = value_or_prompt(args.group_name, "--group-name", "Group name")?;
    exchange(ctx, &target, &delete_group_request(token, group))
}

fn list_groups_request(token: String) -> Request {
    Request::new("list_groups").with_token(token)
}

fn delete_group_request(token: String, group: String) -> Request {
    Request::new("delete_group")
        .with_token(token)
        .with_argument("groupName", group)
}
