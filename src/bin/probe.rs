use std::process::ExitCode;

use chrono::Utc;

use clan_recruiter::client::{ClanSearch, ClashClient};
use clan_recruiter::config::Config;
use clan_recruiter::criteria;
use clan_recruiter::layout::{self, Element, Presets, Resolution};

const USAGE: &str = "Usage: probe [layout <WxH> | player <tag> | clan <tag> | members <tag> \
                     | search <name> | locations | seasons]";

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    // Layout previews need no API token
    if let ["layout", resolution] = args.as_slice() {
        return match resolution.parse::<Resolution>() {
            Ok(resolution) => {
                print_layout(resolution);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{e}");
                ExitCode::FAILURE
            }
        };
    }

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let client = match ClashClient::new(&config.api_base_url, &config.api_token) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("{e:#}");
            return ExitCode::FAILURE;
        }
    };

    let result = match args.as_slice() {
        [] => {
            let ok = client.test_connectivity().await;
            let status = if ok { "reachable" } else { "unreachable" };
            println!("API {}: {status}", config.api_base_url);
            if ok {
                Ok(())
            } else {
                Err("connectivity check failed".to_string())
            }
        }
        ["player", tag] => player(&client, &config, tag).await,
        ["clan", tag] => client
            .fetch_clan(tag)
            .await
            .map(|clan| {
                println!("{} {} level {}", clan.tag, clan.name, clan.clan_level);
                println!("members: {}  points: {}", clan.members, clan.clan_points);
                if let Some(frequency) = &clan.war_frequency {
                    println!("war frequency: {frequency}");
                }
                if let Some(description) = &clan.description {
                    println!("{description}");
                }
            })
            .map_err(|e| e.to_string()),
        ["members", tag] => client
            .fetch_clan_members(tag)
            .await
            .map(|members| {
                for m in &members {
                    let role = m.role.as_deref().unwrap_or("-");
                    println!(
                        "{:<12} {:<16} {:<10} lvl {:>3}  {:>5} trophies",
                        m.tag, m.name, role, m.exp_level, m.trophies
                    );
                }
                println!("{} member(s)", members.len());
            })
            .map_err(|e| e.to_string()),
        ["search", name @ ..] if !name.is_empty() => {
            let search = ClanSearch {
                name: Some(name.join(" ")),
                ..ClanSearch::default()
            };
            client
                .search_clans(&search)
                .await
                .map(|clans| {
                    for c in &clans {
                        println!(
                            "{:<12} {:<20} level {:>2}  {:>2} members",
                            c.tag, c.name, c.clan_level, c.members
                        );
                    }
                })
                .map_err(|e| e.to_string())
        }
        ["locations"] => client
            .locations()
            .await
            .map(|locations| {
                for l in &locations {
                    let code = l.country_code.as_deref().unwrap_or("");
                    println!("{:>8} {code:<3} {}", l.id, l.name);
                }
            })
            .map_err(|e| e.to_string()),
        ["seasons"] => client
            .league_seasons()
            .await
            .map(|seasons| {
                for s in &seasons {
                    println!("{}", s.id);
                }
            })
            .map_err(|e| e.to_string()),
        _ => {
            eprintln!("{USAGE}");
            return ExitCode::FAILURE;
        }
    };

    let limit = client.rate_limit();
    if limit.remaining.is_some() || limit.reset.is_some() {
        println!("rate limit: remaining {:?}, reset {:?}", limit.remaining, limit.reset);
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn player(client: &ClashClient, config: &Config, tag: &str) -> Result<(), String> {
    let player = client.fetch_account(tag).await.map_err(|e| e.to_string())?;

    let town_hall = player
        .town_hall_level
        .map_or_else(|| "?".to_string(), |th| th.to_string());
    println!("{} {} TH{town_hall} level {}", player.tag, player.name, player.exp_level);
    match &player.clan {
        Some(clan) => println!("clan: {} {}", clan.tag, clan.name),
        None => println!("clan: none"),
    }
    println!("last seen: {}", player.last_seen.as_deref().unwrap_or("unknown"));

    let verdict = criteria::evaluate(&player);
    println!("verdict: {verdict}");

    let report = criteria::validate_player(&player, &config.validation_policy(), Utc::now());
    println!(
        "has clan: {}  level ok: {}  town hall ok: {}  active: {}",
        report.has_clan,
        report.meets_level_requirements,
        report.meets_townhall_requirements,
        report.is_active
    );
    Ok(())
}

fn print_layout(resolution: Resolution) {
    let resolved = Presets::builtin().resolve(resolution);
    println!("{resolution} ({:?})", resolved.source);
    for element in Element::ALL {
        if let Some(at) = resolved.layout.get(element) {
            println!("  {element:<18} {at}");
        }
    }
    for (i, at) in resolved.layout.slots.iter().enumerate() {
        println!("  slot {:<13} {at}", i + 1);
    }
    let fits = layout::validate(&resolved.layout, resolution);
    println!("all points on screen: {fits}");
}
