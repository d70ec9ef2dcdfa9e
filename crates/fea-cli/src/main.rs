use std::error::Error;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use fea_ai::{ConfigTranslator, GeminiClient, LanguageModel, TranslationError};
use fea_config::{Discretization, MeshLimitPolicy, SimulationConfig, mesh_precheck};
use fea_driver::{HostError, HostInvocation, JournalBackend, RunOutcome, run_simulation};

type DynError = Box<dyn Error>;

const HOST_PROGRAM: &str = "abaqus";
const HOST_LOG: &str = "abaqus.log";
const CONFIG_FILE: &str = "config.json";
const SCRIPT_FILE: &str = "simulation_runner.jnl";

fn main() -> Result<(), DynError> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();

    match args.first().map(String::as_str) {
        None => run_repl(),
        Some("run") => run_from_file(&args[1..]),
        Some("precheck") => run_precheck(&args[1..]),
        Some("help") | Some("--help") => {
            print_usage();
            Ok(())
        }
        Some(other) => {
            print_usage();
            Err(format!("unknown command: {other}").into())
        }
    }
}

fn run_repl() -> Result<(), DynError> {
    println!("Initializing FEA agent...");

    // Missing credentials are fatal at startup; everything after this point
    // only ever abandons the current turn.
    let client = GeminiClient::from_env()?;
    let mut translator = ConfigTranslator::new(client);
    println!("Language model backend connected.");
    println!("FEA agent is ready.");

    let working_dir = std::env::current_dir()?;
    let config_path = working_dir.join(CONFIG_FILE);
    let script_path = working_dir.join(SCRIPT_FILE);

    let stdin = io::stdin();
    loop {
        println!("\n{}", "=".repeat(50));
        print!("> What simulation would you like to run? (or 'q' to quit)\n> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let request = line.trim();
        if request.is_empty() {
            continue;
        }
        if is_quit_word(request) {
            break;
        }

        run_turn(&mut translator, request, &config_path, &script_path);
    }

    println!("Agent shutting down. Goodbye.");
    Ok(())
}

/// One REPL turn. Every failure path prints a report and returns to the
/// prompt; nothing is retried.
fn run_turn<C: LanguageModel>(
    translator: &mut ConfigTranslator<C>,
    request: &str,
    config_path: &Path,
    script_path: &Path,
) {
    println!("Sending request to the model backend...");
    let translated = match translator.translate(request) {
        Ok(translated) => translated,
        Err(TranslationError::Model(message)) => {
            eprintln!("Error during model backend call: {message}");
            return;
        }
        Err(TranslationError::InvalidJson { raw, .. }) => {
            println!("\n--- LLM VALIDATION FAILED ---");
            println!("The model did not return valid JSON. Aborting.");
            println!("Raw output: {raw}");
            return;
        }
        Err(TranslationError::Invalid(problems)) => {
            println!("\n--- CONFIGURATION REJECTED ---");
            for problem in problems {
                println!("  - {problem}");
            }
            return;
        }
        Err(TranslationError::MeshLimit(precheck)) => {
            println!("\n{}", precheck.report());
            println!("Mesh request rejected; ask for fewer elements.");
            return;
        }
    };

    println!("\n--- CONFIGURATION GENERATED ---");
    println!("{}", translated.config.to_json_pretty());
    println!("-------------------------------");

    if let Err(err) = write_config(&translated.config, config_path) {
        eprintln!("Error saving config file: {err}");
        return;
    }
    println!("Configuration file saved to {}", config_path.display());

    run_model(&translated.config, config_path, script_path, true);
}

fn run_from_file(args: &[String]) -> Result<(), DynError> {
    let mut config_arg = None;
    let mut dry_run = false;
    for arg in args {
        match arg.as_str() {
            "--dry-run" => dry_run = true,
            other if config_arg.is_none() => config_arg = Some(PathBuf::from(other)),
            other => return Err(format!("unexpected argument: {other}").into()),
        }
    }
    let config_path = config_arg.ok_or("usage: fea-cli run <config.json> [--dry-run]")?;

    let raw = fs::read_to_string(&config_path)
        .map_err(|err| format!("cannot read {}: {err}", config_path.display()))?;
    let config = SimulationConfig::from_json_str(&raw)?;

    let script_path = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(SCRIPT_FILE);

    run_model(&config, &config_path, &script_path, !dry_run);
    Ok(())
}

/// Drives the journal backend and, when requested, hands the result to the
/// external host. The mesh precheck is advisory here: it is reported and the
/// run proceeds either way.
fn run_model(config: &SimulationConfig, config_path: &Path, script_path: &Path, invoke: bool) {
    println!("{}", mesh_precheck(&config.discretization).report());

    let mut backend = JournalBackend::new();
    let outcome = match run_simulation(config, &mut backend, MeshLimitPolicy::Advisory) {
        Ok(outcome) => outcome,
        Err(err) => {
            eprintln!("Driver error: {err}");
            return;
        }
    };

    let job = match outcome {
        RunOutcome::Completed { job, .. } => job,
        RunOutcome::NotImplemented { test_type } => {
            println!("'{test_type}' workflow is not implemented yet; nothing to run.");
            return;
        }
    };

    if let Err(err) = backend.write_to(script_path) {
        eprintln!("Error writing host script: {err}");
        return;
    }
    println!("Host script written to {}", script_path.display());

    if !invoke {
        println!("Dry run requested; skipping host invocation.");
        return;
    }

    let invocation = HostInvocation::new(HOST_PROGRAM, script_path, config_path);
    println!(
        "\nRunning host command: {}",
        invocation.command_line().join(" ")
    );
    println!("This may take a moment. Check '{HOST_LOG}' for details.");

    match invocation.invoke() {
        Ok(_) => {
            println!("\n--- Host Run Successful ---");
            println!("Check '{HOST_LOG}' and '{job}.odb' for results.");
        }
        Err(HostError::NotFound { program }) => {
            println!("\n--- Host Run FAILED ---");
            println!("Error: '{program}' command not found.");
            println!("Is the CAE host installed and on your system's PATH?");
        }
        Err(err) => {
            println!("\n--- Host Run FAILED ---");
            println!("{err}");
            println!("Check '{HOST_LOG}' in your directory for the full error message.");
        }
    }
}

fn run_precheck(args: &[String]) -> Result<(), DynError> {
    let elements = parse_elements(args)?;
    println!("{}", mesh_precheck(&elements).report());
    Ok(())
}

fn write_config(config: &SimulationConfig, path: &Path) -> Result<(), DynError> {
    let mut encoded = config.to_json_pretty();
    encoded.push('\n');
    fs::write(path, encoded)?;
    Ok(())
}

fn is_quit_word(word: &str) -> bool {
    matches!(word.to_lowercase().as_str(), "q" | "quit" | "exit")
}

fn parse_elements(args: &[String]) -> Result<Discretization, DynError> {
    if args.len() != 3 {
        return Err("usage: fea-cli precheck <elements_length> <elements_width> <elements_height>".into());
    }
    let mut counts = [0u32; 3];
    for (slot, arg) in counts.iter_mut().zip(args) {
        *slot = arg
            .parse::<u32>()
            .map_err(|err| format!("invalid element count '{arg}': {err}"))?;
    }
    Ok(Discretization {
        elements_length: counts[0],
        elements_width: counts[1],
        elements_height: counts[2],
    })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  fea-cli                 interactive natural-language session");
    eprintln!("  fea-cli run <config.json> [--dry-run]");
    eprintln!("  fea-cli precheck <elements_length> <elements_width> <elements_height>");
}

#[cfg(test)]
mod tests {
    use super::{is_quit_word, parse_elements, write_config};
    use fea_config::{
        Discretization, Geometry, Loading, Material, SimulationConfig, TestType,
    };

    #[test]
    fn quit_words_are_case_insensitive() {
        for word in ["q", "Q", "quit", "QUIT", "exit", "Exit"] {
            assert!(is_quit_word(word), "{word} should quit");
        }
        assert!(!is_quit_word("run"));
        assert!(!is_quit_word(""));
    }

    #[test]
    fn parses_three_element_counts() {
        let args = vec!["20".to_string(), "4".to_string(), "4".to_string()];
        let elements = parse_elements(&args).expect("should parse");
        assert_eq!(
            elements,
            Discretization {
                elements_length: 20,
                elements_width: 4,
                elements_height: 4,
            }
        );

        assert!(parse_elements(&["20".to_string()]).is_err());
        assert!(
            parse_elements(&["a".to_string(), "4".to_string(), "4".to_string()]).is_err()
        );
    }

    #[test]
    fn saved_config_reloads_identically() {
        let config = SimulationConfig {
            model_name: "Save_Check".to_string(),
            test_type: TestType::CantileverBeam,
            geometry: Geometry {
                length_m: 1.0,
                width_m: 0.1,
                height_m: 0.1,
            },
            material: Material {
                name: "Steel".to_string(),
                youngs_modulus_pa: 200e9,
                poisson_ratio: 0.3,
            },
            loading: Loading { tip_load_n: 1000.0 },
            discretization: Discretization {
                elements_length: 10,
                elements_width: 4,
                elements_height: 4,
            },
        };

        let path = std::env::temp_dir().join("fea_cli_config_test.json");
        write_config(&config, &path).expect("config should save");
        let raw = std::fs::read_to_string(&path).expect("config should read back");
        let reloaded = SimulationConfig::from_json_str(&raw).expect("config should decode");
        assert_eq!(reloaded, config);
        let _ = std::fs::remove_file(&path);
    }
}
