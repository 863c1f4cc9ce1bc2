use anyhow::{Result, bail};

use crate::types::{PackageFilter, PackageOperation};

pub(crate) const USAGE: &str = "\
Usage: apkdeck <command> [options]

Commands:
  devices                                   List connected devices
  list <serial> [--filter all|user|system] [--search PATTERN]
                                            Show the package inventory
  detail <serial> <package> [--raw]         Show dumpsys details for a package
  uninstall|enable|disable|reset <serial> <package>... [--yes]
                                            Apply an operation to packages
  shell <serial>                            Interactive session on one device
  config [--init]                           Show or create the settings file
  help                                      Show this message";

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Command {
    Devices,
    List {
        serial: String,
        filter: Option<PackageFilter>,
        search: Option<String>,
    },
    Detail {
        serial: String,
        package: String,
        raw: bool,
    },
    Apply {
        operation: PackageOperation,
        serial: String,
        packages: Vec<String>,
        yes: bool,
    },
    Shell {
        serial: String,
    },
    Config {
        init: bool,
    },
    Help,
}

pub(crate) fn parse_args<I>(args: I) -> Result<Command>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let Some(name) = args.next() else {
        return Ok(Command::Help);
    };
    let rest: Vec<String> = args.collect();

    match name.as_str() {
        "devices" => {
            expect_no_positionals(&name, &rest)?;
            Ok(Command::Devices)
        }
        "list" => parse_list(rest),
        "detail" => parse_detail(rest),
        "shell" => match rest.as_slice() {
            [serial] => Ok(Command::Shell {
                serial: serial.clone(),
            }),
            _ => bail!("shell needs exactly one device serial"),
        },
        "config" => {
            let mut init = false;
            for arg in rest {
                match arg.as_str() {
                    "--init" => init = true,
                    other => bail!("unexpected argument '{other}' for config"),
                }
            }
            Ok(Command::Config { init })
        }
        "help" | "--help" | "-h" => Ok(Command::Help),
        other => match PackageOperation::from_key(other) {
            Some(operation) => parse_apply(operation, rest),
            None => bail!("unknown command '{other}'\n\n{USAGE}"),
        },
    }
}

fn expect_no_positionals(command: &str, rest: &[String]) -> Result<()> {
    if let Some(arg) = rest.first() {
        bail!("unexpected argument '{arg}' for {command}");
    }
    Ok(())
}

fn parse_list(rest: Vec<String>) -> Result<Command> {
    let mut serial = None;
    let mut filter = None;
    let mut search = None;
    let mut args = rest.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--filter" => {
                let Some(value) = args.next() else {
                    bail!("--filter needs a value (all, user or system)");
                };
                let Some(parsed) = PackageFilter::from_key(&value) else {
                    bail!("unknown filter '{value}' (expected all, user or system)");
                };
                filter = Some(parsed);
            }
            "--search" => {
                let Some(value) = args.next() else {
                    bail!("--search needs a pattern");
                };
                search = Some(value);
            }
            flag if flag.starts_with("--") => bail!("unknown option '{flag}' for list"),
            _ if serial.is_none() => serial = Some(arg),
            _ => bail!("unexpected argument '{arg}' for list"),
        }
    }

    let Some(serial) = serial else {
        bail!("list needs a device serial");
    };
    Ok(Command::List {
        serial,
        filter,
        search,
    })
}

fn parse_detail(rest: Vec<String>) -> Result<Command> {
    let mut raw = false;
    let mut positionals = Vec::new();
    for arg in rest {
        match arg.as_str() {
            "--raw" => raw = true,
            flag if flag.starts_with("--") => bail!("unknown option '{flag}' for detail"),
            _ => positionals.push(arg),
        }
    }

    let [serial, package]: [String; 2] = match positionals.try_into() {
        Ok(pair) => pair,
        Err(_) => bail!("detail needs a device serial and one package name"),
    };
    Ok(Command::Detail {
        serial,
        package,
        raw,
    })
}

fn parse_apply(operation: PackageOperation, rest: Vec<String>) -> Result<Command> {
    let mut yes = false;
    let mut positionals = Vec::new();
    for arg in rest {
        match arg.as_str() {
            "--yes" | "-y" => yes = true,
            flag if flag.starts_with('-') => {
                bail!("unknown option '{flag}' for {}", operation.label())
            }
            _ => positionals.push(arg),
        }
    }

    let mut positionals = positionals.into_iter();
    let Some(serial) = positionals.next() else {
        bail!("{} needs a device serial", operation.label());
    };
    let packages: Vec<String> = positionals.collect();
    if packages.is_empty() {
        bail!("{} needs at least one package name", operation.label());
    }

    Ok(Command::Apply {
        operation,
        serial,
        packages,
        yes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Command> {
        parse_args(args.iter().map(|arg| arg.to_string()))
    }

    #[test]
    fn list_accepts_filter_and_search_in_any_order() {
        assert_eq!(
            parse(&["list", "--search", "^com\\.google", "R58", "--filter", "user"]).unwrap(),
            Command::List {
                serial: "R58".to_string(),
                filter: Some(PackageFilter::User),
                search: Some("^com\\.google".to_string()),
            }
        );
    }

    #[test]
    fn operations_collect_packages() {
        assert_eq!(
            parse(&["disable", "emulator-5554", "com.a", "--yes", "com.b"]).unwrap(),
            Command::Apply {
                operation: PackageOperation::Disable,
                serial: "emulator-5554".to_string(),
                packages: vec!["com.a".to_string(), "com.b".to_string()],
                yes: true,
            }
        );
    }

    #[test]
    fn missing_arguments_are_reported() {
        assert!(parse(&["uninstall", "R58"]).is_err());
        assert!(parse(&["detail", "R58"]).is_err());
        assert!(parse(&["list"]).is_err());
        assert!(parse(&["list", "R58", "--filter", "vendor"]).is_err());
        assert!(parse(&["frobnicate"]).is_err());
    }

    #[test]
    fn detail_and_config_flags() {
        assert_eq!(
            parse(&["detail", "R58", "com.a", "--raw"]).unwrap(),
            Command::Detail {
                serial: "R58".to_string(),
                package: "com.a".to_string(),
                raw: true,
            }
        );
        assert_eq!(parse(&["config", "--init"]).unwrap(), Command::Config { init: true });
        assert_eq!(
            parse(&["shell", "R58"]).unwrap(),
            Command::Shell {
                serial: "R58".to_string()
            }
        );
        assert_eq!(parse(&[]).unwrap(), Command::Help);
    }
}
