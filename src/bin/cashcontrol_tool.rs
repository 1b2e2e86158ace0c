#[macro_use]
extern crate log;

use std::io::{self, BufRead, Write};

use anyhow::{anyhow, Result};
use structopt::StructOpt;

use cashcontrol::*;

#[derive(Debug, Clone, StructOpt)]
#[structopt(rename_all = "kebab-case")]
enum CommandAction {
  /// Scans serial ports and baud rates for a register
  Find {
    /// port family substring to narrow the scan, e.g. ttyUSB
    #[structopt(long, short)]
    group: Option<String>,
  },

  /// Full status request
  Status,

  /// Short status request
  ShortStatus,

  /// Device identification
  Metrics,

  /// Sounds the buzzer
  Beep,

  /// Cuts the check ribbon
  Cut {
    /// partial cut instead of a full one
    #[structopt(long)]
    partial: bool,
  },

  /// Feeds the check ribbon
  Feed {
    /// number of rows to feed
    rows: u8,
  },

  /// Runs any parameterless command by its name, e.g. open_session
  Raw { name: String },
}

#[derive(Debug, Clone, StructOpt)]
#[structopt(name = "cashcontrol-tool")]
struct Options {
  /// serial device, e.g. /dev/ttyUSB0 (not needed for find)
  #[structopt(long, short)]
  port: Option<String>,

  /// baud rate
  #[structopt(long, short, default_value = "115200")]
  rate: u32,

  /// device family: shtrih or rr
  #[structopt(long, short, default_value = "shtrih")]
  device_type: String,

  /// path of the SMART metric file
  #[structopt(long, default_value = "cashcontrol_smart.json")]
  smart: String,

  #[structopt(subcommand)]
  action: CommandAction,
}

/// Prompts the operator on stdin whenever a command needs a decision.
struct PromptConsole;

impl Console for PromptConsole {
  fn choose(&mut self, case: &UserCase) -> Reaction {
    if let Some(exception) = &case.exception {
      eprintln!("error {}: {}", exception.code, exception.description);
    }
    for (i, (_, label)) in case.cases.iter().enumerate() {
      eprintln!("  {}: {}", i + 1, label);
    }

    loop {
      eprint!("> ");
      io::stderr().flush().ok();

      let mut line = String::new();
      if io::stdin().lock().read_line(&mut line).is_err() {
        return Reaction::Break;
      }
      if let Ok(choice) = line.trim().parse::<usize>() {
        if choice >= 1 && choice <= case.cases.len() {
          return case.cases[choice - 1].0;
        }
      }
      eprintln!("pick a number between 1 and {}", case.cases.len());
    }
  }
}

fn report(response: &Response) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(response)?);
  match response.action {
    Action::Continue => Ok(()),
    _ => Err(anyhow!("'{}' did not complete", response.command)),
  }
}

fn main() -> Result<()> {
  env_logger::Builder::from_default_env()
    .filter_level(log::LevelFilter::Info)
    .target(env_logger::Target::Stderr)
    .init();

  let opts = Options::from_args();

  let profile = DeviceProfile::from_name(&opts.device_type)
    .ok_or_else(|| anyhow!("unknown device family: {}", opts.device_type))?;

  let manager = match &opts.port {
    Some(port) => PortManager::new(Some(port.clone()), Some(opts.rate))?,
    None => PortManager::closed(),
  };
  let engine = Engine::new(Session::new(manager, profile));
  let mut executor = Executor::new(engine, SmartStore::new(&opts.smart));
  let mut console = PromptConsole;

  let call = match opts.action.clone() {
    CommandAction::Find { group } => Call::FindDevice {
      port_group: group,
      rate: None,
    },
    CommandAction::Status => Call::device(Command::GetStatus),
    CommandAction::ShortStatus => Call::device(Command::GetShortStatus),
    CommandAction::Metrics => Call::device(Command::GetDeviceMetrics),
    CommandAction::Beep => Call::device(Command::Beep),
    CommandAction::Cut { partial } => Call::device(Command::CutCheck { full_cut: !partial }),
    CommandAction::Feed { rows } => Call::device(Command::FeedDocument {
      rows,
      check: true,
      journal: true,
      slip: false,
    }),
    CommandAction::Raw { name } => {
      let kind = CommandKind::from_name(&name)
        .map_err(|_| anyhow!("unknown command: {}", name))?;
      let command = Command::parameterless(kind)
        .ok_or_else(|| anyhow!("'{}' takes parameters; this tool cannot run it", name))?;
      Call::device(command)
    }
  };

  let response = executor.run(&call, &mut console);

  if let (CommandAction::Find { .. }, Reply::FoundDevice { port, rate }) =
    (&opts.action, &response.data)
  {
    info!("remembering {} at {} baud", port, rate);
    executor.set_connection_parameters(port, *rate);
  }

  report(&response)
}
