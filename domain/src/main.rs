use std::env;
use std::process;
use std::time::SystemTime;

use domain::adapters::memory_store::InMemoryStore;
use domain::code::RandomCodeGenerator;
use domain::redirect::RedirectDecision;
use domain::service::ShortenerService;
use domain::validate::{validate_original_url, ValidatorConfig, DEFAULT_BLOCKED_SHORTENERS};
use domain::{Clock, NoopNotifier};

struct StdClock;
impl Clock for StdClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

fn print_usage() {
    eprintln!(
        "{}\n\nUsage:\n  domain check <url> [--own-domain <host>]\n  domain shorten <url>... [--report <reason>]\n\nNotes:\n  - This demo CLI uses an in-memory store; data is not persisted across runs.\n  - `shorten` with --report files a report against each new code and shows how it now resolves.",
        domain::about()
    );
}

/// Split `rest` into positional args and the value of `--<flag>`, if given.
fn take_flag(rest: Vec<String>, flag: &str) -> Result<(Vec<String>, Option<String>), String> {
    let mut positional = Vec::new();
    let mut value = None;
    let mut it = rest.into_iter();
    while let Some(arg) = it.next() {
        if arg == flag {
            match it.next() {
                Some(v) => value = Some(v),
                None => return Err(format!("{} requires a value", flag)),
            }
        } else if arg.starts_with("--") {
            return Err(format!("unknown argument: {}", arg));
        } else {
            positional.push(arg);
        }
    }
    Ok((positional, value))
}

fn run() -> Result<(), String> {
    let mut args = env::args().skip(1);

    let Some(cmd) = args.next() else {
        print_usage();
        return Ok(());
    };

    match cmd.as_str() {
        "check" => {
            let (urls, own_domain) = take_flag(args.collect(), "--own-domain")?;
            let Some(url) = urls.first() else {
                return Err("missing <url> for check".into());
            };
            let cfg = ValidatorConfig::new(DEFAULT_BLOCKED_SHORTENERS.iter(), own_domain);
            match validate_original_url(url, &cfg) {
                Ok(()) => {
                    println!("ok");
                    Ok(())
                }
                Err(reason) => Err(format!("{}: {}", reason.as_str(), reason.message())),
            }
        }
        "shorten" => {
            let (urls, report_reason) = take_flag(args.collect(), "--report")?;
            if urls.is_empty() {
                return Err("missing <url> for shorten".into());
            }
            let svc = ShortenerService::new(
                InMemoryStore::new(),
                RandomCodeGenerator::new(),
                StdClock,
                NoopNotifier,
            );
            for url in &urls {
                let res = svc
                    .shorten(url)
                    .map_err(|e| format!("shorten failed for {}: {}", url, e))?;
                let tag = if res.already_existed { "existing" } else { "created" };
                println!("{}: {} -> {}", tag, res.record.code, res.record.original_url);

                if let (Some(reason), false) = (&report_reason, res.already_existed) {
                    let code = res.record.code.as_str();
                    svc.report(code, reason)
                        .map_err(|e| format!("report failed: {}", e))?;
                    match svc.resolve(code, false) {
                        Ok(RedirectDecision::Warn { kind, .. }) => {
                            println!("  reported; visits now show a warning ({:?})", kind)
                        }
                        Ok(other) => println!("  reported; resolves to {:?}", other),
                        Err(e) => return Err(format!("resolve failed: {}", e)),
                    }
                }
            }
            println!("total links: {}", svc.link_count().map_err(|e| e.to_string())?);
            Ok(())
        }
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn main() {
    if let Err(msg) = run() {
        eprintln!("error: {}", msg);
        process::exit(1);
    }
}
