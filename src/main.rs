use anyhow::Result;
use colored::*;
use std::str::FromStr;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use lab_assist::build_orchestrator;
use lab_assist::config::Config;
use lab_assist::models::{
    Language, ProviderKind, SearchMethod, SocialPlatform, TestSubmissionFormInputs,
};
use lab_assist::notifications::NotificationEvent;
use lab_assist::orchestrator::Orchestrator;
use lab_assist::visual::Visual;

const HELP: &str = "\
Type a message to chat with the lab consultant, or a command:
  /recommend <sample> | <issue> [| <details>]   test recommendation
  /details                                      details for recommended tests
  /autofill <description>                       infer optional form fields
  /dropoff                                      nearby drop-off for the last assessment
  /providers <query>    /nearby <query>         distributors by text or location
  /vets <query>                                 veterinarians near you
  /search <query>                               search the site
  /trends                                       today's industry trends
  /post <platform> <topic>                      social post with image
  /adapt                                        turn the last post into an article
  /lang <en|fa|ar>  /login  /logout  /dismiss  /help  /quit";

#[tokio::main]
async fn main() -> Result<()> {
    // Logs on stderr, results on stdout
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load();
    let orchestrator = build_orchestrator(&config)?;
    tracing::info!(language = %config.app.language, "main: lab assistant ready");

    // Print toasts as they arrive
    let mut events = orchestrator.notifications().subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let NotificationEvent::Pushed(notification) = event {
                Visual::notification(&notification);
            }
        }
    });

    if let Some(last) = orchestrator.conversation().last() {
        Visual::reply(&last.text);
    }
    println!("{}", HELP.dimmed());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("{} ", "you>".bright_green().bold());
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "/quit" | "/exit") {
            break;
        }
        dispatch(&orchestrator, line).await;
        if orchestrator.is_quota_exhausted() {
            Visual::quota_banner();
        }
    }

    tracing::info!("main: session closed");
    Ok(())
}

async fn dispatch(orch: &Orchestrator, line: &str) {
    let Some(command) = line.strip_prefix('/') else {
        if orch.send_chat_message(line).await.is_ok() {
            if let Some(last) = orch.conversation().last() {
                Visual::reply(&last.text);
            }
        }
        return;
    };

    let (name, rest) = command
        .split_once(char::is_whitespace)
        .map(|(name, rest)| (name, rest.trim()))
        .unwrap_or((command, ""));

    // Failures are already reported through the notification channel
    match name {
        "help" => println!("{}", HELP.dimmed()),
        "login" => orch.login(),
        "logout" => orch.logout(),
        "dismiss" => orch.dismiss_quota_warning(),
        "lang" => match Language::from_str(rest) {
            Ok(language) => orch.set_language(language),
            Err(e) => eprintln!("{}", e.red()),
        },
        "recommend" => {
            let mut fields = rest.split('|').map(str::trim);
            let inputs = TestSubmissionFormInputs {
                sample_type: fields.next().unwrap_or_default().to_string(),
                suspected_issue: fields.next().unwrap_or_default().to_string(),
                specific_conditions: fields.next().unwrap_or_default().to_string(),
                ..Default::default()
            };
            if orch.get_recommendation(&inputs, None).await.is_ok() {
                if let Some(rec) = orch.snapshot().recommendation.value() {
                    Visual::recommendation(rec);
                }
            }
        }
        "details" => {
            if orch.get_test_details().await.is_ok() {
                if let Some(details) = orch.snapshot().test_details.value() {
                    Visual::test_details(details);
                }
            }
        }
        "autofill" => {
            if orch.auto_fill_details(rest).await.is_ok() {
                if let Some(details) = orch.snapshot().auto_fill.value() {
                    Visual::auto_fill(details);
                }
            }
        }
        "dropoff" => {
            let assessment = orch
                .snapshot()
                .recommendation
                .value()
                .map(|rec| rec.primary_assessment.clone());
            match assessment {
                Some(assessment) => {
                    if orch.find_dropoff_location(&assessment).await.is_ok() {
                        show_providers(orch);
                    }
                }
                None => eprintln!("{}", "Run /recommend first.".yellow()),
            }
        }
        "providers" | "nearby" | "vets" => {
            let method = if name == "providers" {
                SearchMethod::Text
            } else {
                SearchMethod::Geo
            };
            let kind = if name == "vets" {
                ProviderKind::Veterinarian
            } else {
                ProviderKind::Distributor
            };
            if orch.search_providers(method, rest, kind).await.is_ok() {
                show_providers(orch);
            }
        }
        "search" => {
            if orch.semantic_search(rest).await.is_ok() {
                if let Some(results) = orch.snapshot().search.value() {
                    Visual::search_results(results);
                }
            }
        }
        "trends" => {
            if orch.fetch_trends().await.is_ok() {
                if let Some(trends) = orch.snapshot().trends.value() {
                    Visual::trends(trends);
                }
            }
        }
        "post" => {
            let (platform, topic) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            match SocialPlatform::from_str(platform) {
                Ok(platform) => {
                    // Text survives an image failure, so render either way
                    let _ = orch.generate_post(topic.trim(), platform).await;
                    if let Some(post) = orch.snapshot().post.value() {
                        Visual::post(post);
                    }
                }
                Err(e) => eprintln!("{}", e.red()),
            }
        }
        "adapt" => {
            if orch.adapt_post().await.is_ok() {
                if let Some(adapted) = orch.snapshot().adapted_post.value() {
                    Visual::adapted(adapted);
                }
            }
        }
        other => eprintln!("{} /{}", "Unknown command:".red(), other),
    }
}

fn show_providers(orch: &Orchestrator) {
    if let Some(providers) = orch.snapshot().providers.value() {
        Visual::providers(providers);
    }
}
