//! Per-client command dispatch.
//!
//! A [`Session`] holds the protocol state of one client (its id, declared
//! name, and any `bcore_write` waiting for its payload) and turns frames into
//! replies. It never touches the socket, which keeps it testable in isolation.

use tracing::{debug, info};

use crate::{
    emulator::{ConsoleType, Emulator},
    error::CommandError,
    memory,
    message::Reply,
    region::MemoryRegion,
};

pub const NWA_VERSION: &str = "1.0";

/// The one core this server knows how to describe.
pub const SNES_CORE: CoreDescriptor = CoreDescriptor {
    name: "SnesCore",
    platform: "SNES",
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreDescriptor {
    pub name: &'static str,
    pub platform: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    MyNameIs,
    EmulatorInfo,
    EmulationStatus,
    GameInfo,
    CoresList,
    CoreMemories,
    CoreInfo,
    CoreCurrentInfo,
    CoreReset,
    EmulationReset,
    EmulationStop,
    EmulationPause,
    EmulationResume,
    EmulationReload,
    CoreRead,
    BCoreWrite,
}

impl Verb {
    pub const ALL: [Verb; 16] = [
        Verb::EmulatorInfo,
        Verb::EmulationStatus,
        Verb::GameInfo,
        Verb::CoresList,
        Verb::CoreMemories,
        Verb::CoreInfo,
        Verb::CoreCurrentInfo,
        Verb::MyNameIs,
        Verb::CoreRead,
        Verb::BCoreWrite,
        Verb::CoreReset,
        Verb::EmulationPause,
        Verb::EmulationStop,
        Verb::EmulationReset,
        Verb::EmulationResume,
        Verb::EmulationReload,
    ];

    /// Lower-case keyword as matched on the wire.
    pub fn keyword(self) -> &'static str {
        match self {
            Verb::MyNameIs => "my_name_is",
            Verb::EmulatorInfo => "emulator_info",
            Verb::EmulationStatus => "emulation_status",
            Verb::GameInfo => "game_info",
            Verb::CoresList => "cores_list",
            Verb::CoreMemories => "core_memories",
            Verb::CoreInfo => "core_info",
            Verb::CoreCurrentInfo => "core_current_info",
            Verb::CoreReset => "core_reset",
            Verb::EmulationReset => "emulation_reset",
            Verb::EmulationStop => "emulation_stop",
            Verb::EmulationPause => "emulation_pause",
            Verb::EmulationResume => "emulation_resume",
            Verb::EmulationReload => "emulation_reload",
            Verb::CoreRead => "core_read",
            Verb::BCoreWrite => "bcore_write",
        }
    }

    /// Name advertised by `emulator_info`; binary verbs keep their `b` prefix lower-case.
    pub fn advertised(self) -> String {
        match self {
            Verb::BCoreWrite => "bCORE_WRITE".to_string(),
            _ => self.keyword().to_ascii_uppercase(),
        }
    }

    /// Resolves a verb token, ignoring ASCII case.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        let verb = match keyword.to_ascii_lowercase().as_str() {
            "my_name_is" => Verb::MyNameIs,
            "emulator_info" => Verb::EmulatorInfo,
            "emulation_status" => Verb::EmulationStatus,
            "game_info" => Verb::GameInfo,
            "cores_list" => Verb::CoresList,
            "core_memories" => Verb::CoreMemories,
            "core_info" => Verb::CoreInfo,
            "core_current_info" => Verb::CoreCurrentInfo,
            "core_reset" => Verb::CoreReset,
            "emulation_reset" => Verb::EmulationReset,
            "emulation_stop" => Verb::EmulationStop,
            "emulation_pause" => Verb::EmulationPause,
            "emulation_resume" => Verb::EmulationResume,
            "emulation_reload" => Verb::EmulationReload,
            "core_read" => Verb::CoreRead,
            "bcore_write" => Verb::BCoreWrite,
            _ => return None,
        };
        Some(verb)
    }
}

/// A parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub verb: Option<Verb>,
    pub args: Vec<String>,
}

impl Request {
    /// Splits `line` into a case-insensitive verb and `;`-separated arguments.
    pub fn parse(line: &str) -> Self {
        let (keyword, rest) = line
            .split_once(char::is_whitespace)
            .unwrap_or((line, ""));
        let args = if rest.is_empty() {
            Vec::new()
        } else {
            rest.split(';').map(str::to_string).collect()
        };
        Self {
            verb: Verb::from_keyword(keyword),
            args,
        }
    }
}

/// A binary command announced by a text command and completed by the next binary frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingBinaryCommand {
    Idle,
    AwaitingPayload { verb: Verb, args: Vec<String> },
}

#[derive(Debug)]
pub struct Session {
    id: u64,
    client_name: Option<String>,
    pending: PendingBinaryCommand,
}

impl Session {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            client_name: None,
            pending: PendingBinaryCommand::Idle,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn client_name(&self) -> Option<&str> {
        self.client_name.as_deref()
    }

    /// Handles one text command. `None` means the command replies later.
    pub fn handle_line(&mut self, line: &str, emulator: &dyn Emulator) -> Option<Reply> {
        let request = Request::parse(line);
        debug!(id = self.id, verb = ?request.verb, "handling command");
        match self.execute(request, emulator) {
            Ok(reply) => reply,
            Err(err) => Some(Reply::error(&err)),
        }
    }

    /// Handles one binary frame. The acknowledgement envelope always closes the sequence.
    pub fn handle_binary(&mut self, payload: &[u8], emulator: &dyn Emulator) -> Vec<Reply> {
        let pending = std::mem::replace(&mut self.pending, PendingBinaryCommand::Idle);
        let outcome = match pending {
            PendingBinaryCommand::AwaitingPayload {
                verb: Verb::BCoreWrite,
                args,
            } => memory::write(emulator, &args, payload),
            PendingBinaryCommand::AwaitingPayload { .. } | PendingBinaryCommand::Idle => {
                Err(CommandError::UnknownBinaryCommand)
            }
        };

        match outcome {
            Ok(()) => vec![Reply::ack()],
            Err(err) => vec![Reply::error(&err), Reply::ack()],
        }
    }

    fn execute(
        &mut self,
        request: Request,
        emulator: &dyn Emulator,
    ) -> Result<Option<Reply>, CommandError> {
        let Request { verb, mut args } = request;
        let Some(verb) = verb else {
            return Err(CommandError::UnknownCommand);
        };

        let reply = match verb {
            Verb::MyNameIs => self.my_name_is(args.into_iter().next())?,
            Verb::EmulatorInfo => self.emulator_info(emulator),
            Verb::EmulationStatus => emulation_status(emulator),
            Verb::GameInfo => game_info(emulator),
            Verb::CoresList => Reply::fields([
                ("name", SNES_CORE.name),
                ("platform", SNES_CORE.platform),
            ]),
            Verb::CoreMemories => core_memories(emulator),
            Verb::CoreInfo => {
                let core_name = args.first().map(String::as_str).unwrap_or_default();
                core_info(core_name, emulator)?
            }
            Verb::CoreCurrentInfo => core_current_info(emulator)?,
            Verb::CoreReset | Verb::EmulationReset => {
                emulator.reset();
                Reply::ack()
            }
            Verb::EmulationStop => {
                emulator.stop();
                Reply::ack()
            }
            Verb::EmulationPause => {
                emulator.pause();
                Reply::ack()
            }
            Verb::EmulationResume => {
                emulator.resume();
                Reply::ack()
            }
            Verb::EmulationReload => {
                emulator.power_cycle();
                Reply::ack()
            }
            Verb::CoreRead => {
                if args.is_empty() {
                    return Err(CommandError::Arity { verb: "CORE_READ" });
                }
                let region = args.remove(0);
                Reply::Binary(memory::read(emulator, &region, &args)?)
            }
            Verb::BCoreWrite => {
                self.pending = PendingBinaryCommand::AwaitingPayload { verb, args };
                return Ok(None);
            }
        };
        Ok(Some(reply))
    }

    fn my_name_is(&mut self, name: Option<String>) -> Result<Reply, CommandError> {
        let name = name.ok_or(CommandError::MissingArgument {
            verb: "MY_NAME_IS",
            argument: "name",
        })?;
        info!(id = self.id, name = %name, "client set its name");
        let reply = Reply::fields([("name", name.clone())]);
        self.client_name = Some(name);
        Ok(reply)
    }

    fn emulator_info(&self, emulator: &dyn Emulator) -> Reply {
        let commands = Verb::ALL
            .into_iter()
            .map(Verb::advertised)
            .collect::<Vec<_>>()
            .join(",");
        Reply::fields([
            ("name", emulator.name().to_string()),
            ("version", emulator.version().to_string()),
            ("nwa_version", NWA_VERSION.to_string()),
            ("id", self.id.to_string()),
            ("commands", commands),
        ])
    }
}

fn emulation_status(emulator: &dyn Emulator) -> Reply {
    let game = emulator.game().map(|game| game.file).unwrap_or_default();
    Reply::fields([
        ("state", emulator.status().as_str().to_string()),
        ("game", game),
    ])
}

fn game_info(emulator: &dyn Emulator) -> Reply {
    let game = emulator.game().unwrap_or_default();
    let unknown = || "Unknown".to_string();
    Reply::fields([
        ("name", game.name),
        ("file", game.file),
        ("region", game.region.unwrap_or_else(unknown)),
        ("type", game.kind.unwrap_or_else(unknown)),
    ])
}

fn core_memories(emulator: &dyn Emulator) -> Reply {
    let memory = emulator.lock();
    let mut fields = Vec::with_capacity(MemoryRegion::ALL.len() * 3);
    for region in MemoryRegion::ALL {
        fields.push(("name", region.name().to_string()));
        fields.push(("access", "rw".to_string()));
        fields.push(("size", memory::exposed_size(&*memory, region).to_string()));
    }
    Reply::fields(fields)
}

fn core_info(core_name: &str, emulator: &dyn Emulator) -> Result<Reply, CommandError> {
    if core_name != SNES_CORE.name {
        return Err(CommandError::InvalidCore);
    }
    Ok(Reply::fields([
        ("platform", SNES_CORE.platform.to_string()),
        ("name", SNES_CORE.name.to_string()),
        ("version", emulator.version().to_string()),
        ("file", emulator.name().to_string()),
    ]))
}

fn core_current_info(emulator: &dyn Emulator) -> Result<Reply, CommandError> {
    match emulator.console() {
        Some(ConsoleType::Snes) => core_info(SNES_CORE.name, emulator),
        _ => Err(CommandError::UnsupportedCore),
    }
}
