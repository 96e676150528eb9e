use clap::Parser;
use flashbang::cli::args::{Args, Command, Provider};
use std::path::PathBuf;

#[test]
fn given_no_subcommand_when_parsing_then_fails() {
    // Arrange
    let args = vec!["flashbang"];

    // Act & Assert
    let result = Args::try_parse_from(args);
    assert!(result.is_err(), "Should fail without subcommand");
}

#[test]
fn given_list_command_when_parsing_then_uses_default_config() {
    // Arrange
    let args = vec!["flashbang", "list"];

    // Act
    let parsed = Args::try_parse_from(args).unwrap();

    // Assert
    assert_eq!(parsed.config, PathBuf::from("flashbang.toml"));
    assert_eq!(parsed.verbose, 0);
    match parsed.command {
        Command::List { detailed } => assert!(!detailed),
        _ => panic!("Expected List command"),
    }
}

#[test]
fn given_global_flags_after_subcommand_when_parsing_then_succeeds() {
    let args = vec!["flashbang", "list", "--detailed", "-c", "/tmp/course.toml", "-vv"];

    let parsed = Args::try_parse_from(args).unwrap();

    assert_eq!(parsed.config, PathBuf::from("/tmp/course.toml"));
    assert_eq!(parsed.verbose, 2);
    assert!(matches!(parsed.command, Command::List { detailed: true }));
}

#[test]
fn given_extract_flags_when_parsing_then_succeeds() {
    let args = vec!["flashbang", "extract", "-u", "unit_1", "--no-images", "--no-describe"];

    let parsed = Args::try_parse_from(args).unwrap();

    match parsed.command {
        Command::Extract {
            unit,
            no_images,
            no_describe,
        } => {
            assert_eq!(unit.as_deref(), Some("unit_1"));
            assert!(no_images);
            assert!(no_describe);
        }
        _ => panic!("Expected Extract command"),
    }
}

#[test]
fn given_provider_override_when_parsing_generate_then_parsed_as_enum() {
    let args = vec!["flashbang", "generate", "-p", "ollama"];

    let parsed = Args::try_parse_from(args).unwrap();

    match parsed.command {
        Command::Generate { unit, provider } => {
            assert_eq!(unit, None);
            assert_eq!(provider, Some(Provider::Ollama));
        }
        _ => panic!("Expected Generate command"),
    }
}

#[test]
fn given_unknown_provider_when_parsing_generate_then_fails() {
    let result = Args::try_parse_from(vec!["flashbang", "generate", "-p", "gpt"]);

    assert!(result.is_err());
}

#[test]
fn given_package_all_when_parsing_then_succeeds() {
    let args = vec!["flashbang", "package", "--all", "--strict", "--stop-on-error"];

    let parsed = Args::try_parse_from(args).unwrap();

    match parsed.command {
        Command::Package {
            unit,
            all,
            strict,
            stop_on_error,
        } => {
            assert_eq!(unit, None);
            assert!(all);
            assert!(strict);
            assert!(stop_on_error);
        }
        _ => panic!("Expected Package command"),
    }
}

#[test]
fn given_package_without_unit_or_all_when_parsing_then_fails() {
    let result = Args::try_parse_from(vec!["flashbang", "package"]);

    assert!(result.is_err());
}

#[test]
fn given_package_with_unit_and_all_when_parsing_then_fails() {
    let result = Args::try_parse_from(vec!["flashbang", "package", "-u", "unit_1", "--all"]);

    assert!(result.is_err());
}

#[test]
fn given_validate_without_unit_when_parsing_then_fails() {
    let result = Args::try_parse_from(vec!["flashbang", "validate"]);

    assert!(result.is_err());
}

#[test]
fn given_config_flags_when_parsing_then_succeeds() {
    let parsed = Args::try_parse_from(vec!["flashbang", "config", "--validate"]).unwrap();

    assert!(matches!(
        parsed.command,
        Command::Config {
            show: false,
            validate: true
        }
    ));
}

#[test]
fn given_init_force_when_parsing_then_succeeds() {
    let parsed = Args::try_parse_from(vec!["flashbang", "init", "--force"]).unwrap();

    assert!(matches!(parsed.command, Command::Init { force: true }));
}

#[test]
fn given_analyze_with_context_length_when_parsing_then_succeeds() {
    let parsed =
        Args::try_parse_from(vec!["flashbang", "analyze", "-u", "unit_2", "--context-length", "4096"])
            .unwrap();

    match parsed.command {
        Command::Analyze {
            unit,
            context_length,
        } => {
            assert_eq!(unit.as_deref(), Some("unit_2"));
            assert_eq!(context_length, Some(4096));
        }
        _ => panic!("Expected Analyze command"),
    }
}
