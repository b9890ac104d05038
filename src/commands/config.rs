use serde::Serialize;

use crate::cli::ConfigCommand;
use crate::config::{self, Settings};
use crate::context::AppContext;
use crate::error::{AppError, AppResult};

#[derive(Debug, Serialize)]
struct SettingsView<'a> {
    profile: &'a str,
    path: String,
    exists: bool,
    settings: &'a Settings,
}

pub fn run(ctx: &AppContext, command: ConfigCommand) -> AppResult<()> {
    let path = ctx.paths.settings_file(&ctx.profile);

    match command {
        ConfigCommand::Show => {
            let view = SettingsView {
                profile: &ctx.profile,
                path: path.display().to_string(),
                exists: path.exists(),
                settings: &ctx.settings,
            };
            let text = format!(
                "# {}{}\n{}",
                view.path,
                if view.exists { "" } else { " (not written yet)" },
                serde_json::to_string_pretty(&ctx.settings)?
            );
            ctx.output.emit(&text, &view)
        }
        ConfigCommand::Init { force } => {
            if path.exists() && !force {
                return Err(AppError::InvalidInput(format!(
                    "{} already exists. pass --force to overwrite it",
                    path.display()
                )));
            }

            let defaults = Settings::default();
            config::save_settings(&ctx.paths, &ctx.profile, &defaults)?;
            let view = SettingsView {
                profile: &ctx.profile,
                path: path.display().to_string(),
                exists: true,
                settings: &defaults,
            };
            ctx.output
                .emit(&format!("wrote default settings to {}", view.path), &view)
        }
    }
}
