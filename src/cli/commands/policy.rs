use crate::domain::models::PolicyProfile;
use clap::Args;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Args)]
pub struct PolicyArgs {
    pub name: String,
}

pub async fn run(profiles: &Arc<HashMap<String, PolicyProfile>>, args: PolicyArgs) -> anyhow::Result<()> {
    match profiles.get(&args.name) {
        Some(profile) => {
            println!("{}", crate::cli::display::tree::render_policy_profile(profile));
            Ok(())
        }
        None => anyhow::bail!("no such policy profile: {}", args.name),
    }
}
