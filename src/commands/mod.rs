use crate::bot::CommandContext;

pub mod birthday;

#[poise::command(slash_command, track_edits)]
/// Show the help menu
pub async fn help(
    ctx: CommandContext<'_>,
    #[description = "Specific command to show help about"] command: Option<String>,
) -> Result<(), anyhow::Error> {
    poise::builtins::help(
        ctx,
        command.as_deref(),
        poise::builtins::HelpConfiguration::default(),
    )
    .await?;

    Ok(())
}
