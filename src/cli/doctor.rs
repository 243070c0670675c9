//! Environment diagnostics

use anyhow::Result;

use crate::config::Config;
use crate::remote::{ApiKind, CookieFile, CredentialProvider};
use crate::sync::{local_sources, SyncOptions};

/// Cookie names that indicate a live ChatGPT session
const CHATGPT_SESSION_KEYS: &[&str] = &[
    "__Secure-next-auth.session-token",
    "__Secure-next-auth.session-token.0",
    "__Secure-next-auth.session-token.1",
    "cf_clearance",
    "__cf_bm",
];

pub fn run(config: &Config, verbose: bool) -> Result<()> {
    let db = config.database_path();
    println!("database: {} ({})", db.display(), presence(db.exists()));
    let state = config.state_path();
    println!("sync state: {} ({})", state.display(), presence(state.exists()));

    for source in local_sources(config, &SyncOptions::default()) {
        println!("{}: {} ({})", source.kind, source.root.display(), presence(source.root.exists()));
    }

    let cookie_path = config.cookie_file();
    println!("cookies: {} ({})", cookie_path.display(), presence(cookie_path.exists()));
    let cookies = CookieFile::new(&cookie_path);

    let targets: Vec<&str> = ApiKind::ALL.iter().flat_map(|api| api.domains().iter().copied()).collect();
    for profile in &config.credentials.profiles {
        let mut summary = vec![];
        for target in &targets {
            let found = !cookies.cookies_for(target, profile)?.is_empty();
            summary.push(format!("{}={}", target, if found { "yes" } else { "no" }));
        }
        println!("{}: {}", profile, summary.join(", "));

        if verbose {
            let domains = cookies.domains(profile)?;
            println!("{}: cookie domains: {}", profile, domains.join(", "));
            let chatgpt = cookies.cookies_for("chatgpt.com", profile)?;
            let keys: Vec<&str> = CHATGPT_SESSION_KEYS
                .iter()
                .copied()
                .filter(|k| chatgpt.contains_key(*k))
                .collect();
            println!(
                "{}: chatgpt cookies={} keys={}",
                profile,
                chatgpt.len(),
                if keys.is_empty() { "none".to_string() } else { keys.join(",") }
            );
        }
    }

    Ok(())
}

fn presence(exists: bool) -> &'static str {
    if exists {
        "found"
    } else {
        "missing"
    }
}
