mod json;
mod markdown;
mod users;

pub use json::{print_error, print_json, prune, to_pruned_json};
pub use markdown::{convert_mrkdwn, format_markdown, parse_slack_ts};
pub use users::{display_name, UserDirectory, UserResolver};
