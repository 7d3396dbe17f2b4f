use crate::sound_policy::{Sound, SOUND_COUNT};
use log::warn;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use tokio::sync::mpsc::UnboundedSender;

/// Event name the records are emitted under
pub const NMEA2000_JSON_OUT: &str = "nmea2000JsonOut";

/// Switch Bank Control
pub const SWITCH_BANK_CONTROL_PGN: u32 = 127502;
/// NMEA - Request/Command/Acknowledge group function
pub const GROUP_FUNCTION_PGN: u32 = 126208;
/// Configuration Information, carries the proprietary device commands
pub const CONFIGURATION_INFORMATION_PGN: u32 = 126998;

/// Prefix of commands understood by Yacht Devices products
const YD_PREFIX: &str = "YD:";
/// Parameter of the Configuration Information PGN holding the command text
const INSTALLATION_DESCRIPTION_PARAMETER: u8 = 2;

#[derive(PartialEq, Eq, Debug, Clone, Copy, Deserialize)]
pub enum DeviceMode {
    #[serde(rename = "MOB")]
    ManOverBoard,
    #[serde(rename = "DS")]
    DigitalSwitching,
    #[serde(rename = "ENGINE")]
    Engine,
}

impl DeviceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceMode::ManOverBoard => "MOB",
            DeviceMode::DigitalSwitching => "DS",
            DeviceMode::Engine => "ENGINE",
        }
    }
}

/// Configuration commands for the alarm button
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum YdCommand {
    Mode(DeviceMode),
    Bank(u8),
    Volume(u8),
}

impl Display for YdCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            YdCommand::Mode(mode) => write!(f, "MODE {}", mode.as_str()),
            YdCommand::Bank(bank) => write!(f, "BANK {}", bank),
            YdCommand::Volume(volume) => write!(f, "VOLUME {}", volume),
        }
    }
}

#[derive(PartialEq, Eq, Debug, Clone)]
pub enum DeviceCommand {
    /// Set the switch bank so that only `sound` is on. `None` turns every
    /// switch off.
    Switches {
        dst: u8,
        bank: u8,
        sound: Option<Sound>,
    },
    Configure {
        dst: u8,
        command: YdCommand,
    },
}

impl DeviceCommand {
    pub fn play(dst: u8, bank: u8, sound: Sound) -> DeviceCommand {
        DeviceCommand::Switches {
            dst,
            bank,
            sound: Some(sound),
        }
    }

    pub fn silence_all(dst: u8, bank: u8) -> DeviceCommand {
        DeviceCommand::Switches {
            dst,
            bank,
            sound: None,
        }
    }

    pub fn event_name(&self) -> &'static str {
        NMEA2000_JSON_OUT
    }

    /// State of switch 1 to 28, or None if this isn't a switch command
    pub fn switch_states(&self) -> Option<[bool; SOUND_COUNT as usize]> {
        match self {
            DeviceCommand::Switches { sound, .. } => {
                let mut states = [false; SOUND_COUNT as usize];
                if let Some(sound) = sound {
                    if let Some(state) = usize::from(sound.id())
                        .checked_sub(1)
                        .and_then(|i| states.get_mut(i))
                    {
                        *state = true;
                    }
                }
                Some(states)
            }
            DeviceCommand::Configure { .. } => None,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct CommandParameter {
    parameter: u8,
    value: String,
}

#[derive(Serialize)]
struct GroupFunctionCommand {
    pgn: u32,
    #[serde(rename = "PGN")]
    commanded_pgn: u32,
    dst: u8,
    #[serde(rename = "Function Code")]
    function_code: &'static str,
    #[serde(rename = "# of Parameters")]
    parameter_count: usize,
    list: Vec<CommandParameter>,
}

impl Serialize for DeviceCommand {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            DeviceCommand::Switches { dst, bank, .. } => {
                let states = self.switch_states().unwrap_or_default();
                let mut map = serializer.serialize_map(Some(4 + states.len()))?;
                map.serialize_entry("pgn", &SWITCH_BANK_CONTROL_PGN)?;
                map.serialize_entry("dst", dst)?;
                map.serialize_entry("Switch Bank Instance", bank)?;
                map.serialize_entry("Instance", bank)?;
                for (i, on) in states.iter().enumerate() {
                    map.serialize_entry(
                        &format!("Switch{}", i + 1),
                        if *on { "On" } else { "Off" },
                    )?;
                }
                map.end()
            }
            DeviceCommand::Configure { dst, command } => {
                let list = vec![CommandParameter {
                    parameter: INSTALLATION_DESCRIPTION_PARAMETER,
                    value: format!("{}{}", YD_PREFIX, command),
                }];
                GroupFunctionCommand {
                    pgn: GROUP_FUNCTION_PGN,
                    commanded_pgn: CONFIGURATION_INFORMATION_PGN,
                    dst: *dst,
                    function_code: "Command",
                    parameter_count: list.len(),
                    list,
                }
                .serialize(serializer)
            }
        }
    }
}

/// Receives device commands. Emitting never blocks and never reports back.
pub trait CommandSink {
    fn emit(&mut self, command: DeviceCommand);
}

impl CommandSink for Vec<DeviceCommand> {
    fn emit(&mut self, command: DeviceCommand) {
        self.push(command);
    }
}

/// Queues commands for the output writer
#[derive(Clone)]
pub struct ChannelSink {
    tx: UnboundedSender<DeviceCommand>,
}

impl ChannelSink {
    pub fn new(tx: UnboundedSender<DeviceCommand>) -> ChannelSink {
        ChannelSink { tx }
    }
}

impl CommandSink for ChannelSink {
    fn emit(&mut self, command: DeviceCommand) {
        if let Err(e) = self.tx.send(command) {
            warn!("Output closed, dropped command {:?}", e.0);
        }
    }
}

#[cfg(test)]
use serde_json::json;

#[test]
fn test_switch_states() {
    let play = DeviceCommand::play(67, 10, Sound::from_config(Some(5)));
    let states = play.switch_states().unwrap();
    assert_eq!(states.iter().filter(|on| **on).count(), 1);
    assert!(states[4]);
    let off = DeviceCommand::silence_all(67, 10).switch_states().unwrap();
    assert!(off.iter().all(|on| !on));
    let configure = DeviceCommand::Configure {
        dst: 67,
        command: YdCommand::Bank(10),
    };
    assert_eq!(configure.switch_states(), None);
}

#[test]
fn test_switch_record() {
    let play = DeviceCommand::play(67, 10, Sound::from_config(Some(28)));
    let record = serde_json::to_value(&play).unwrap();
    assert_eq!(record["pgn"], json!(127502));
    assert_eq!(record["dst"], json!(67));
    assert_eq!(record["Switch Bank Instance"], json!(10));
    assert_eq!(record["Instance"], json!(10));
    assert_eq!(record["Switch1"], json!("Off"));
    assert_eq!(record["Switch28"], json!("On"));
    assert!(record.get("Switch29").is_none());
    assert!(record.get("Switch0").is_none());
    assert_eq!(record.as_object().unwrap().len(), 4 + 28);

    let off = serde_json::to_value(&DeviceCommand::silence_all(67, 10)).unwrap();
    for i in 1..=28 {
        assert_eq!(off[format!("Switch{}", i)], json!("Off"));
    }
}

#[test]
fn test_configure_record() {
    let cmd = DeviceCommand::Configure {
        dst: 67,
        command: YdCommand::Volume(40),
    };
    assert_eq!(cmd.event_name(), "nmea2000JsonOut");
    assert_eq!(
        serde_json::to_value(&cmd).unwrap(),
        json!({
            "pgn": 126208,
            "PGN": 126998,
            "dst": 67,
            "Function Code": "Command",
            "# of Parameters": 1,
            "list": [{"Parameter": 2, "Value": "YD:VOLUME 40"}]
        })
    );
}

#[test]
fn test_command_text() {
    assert_eq!(YdCommand::Bank(10).to_string(), "BANK 10");
    assert_eq!(YdCommand::Volume(0).to_string(), "VOLUME 0");
    assert_eq!(
        YdCommand::Mode(DeviceMode::DigitalSwitching).to_string(),
        "MODE DS"
    );
}

#[test]
fn test_channel_sink() {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let mut sink = ChannelSink::new(tx);
    sink.emit(DeviceCommand::silence_all(1, 2));
    assert_eq!(rx.try_recv().ok(), Some(DeviceCommand::silence_all(1, 2)));
    drop(rx);
    // Must not panic when the writer is gone
    sink.emit(DeviceCommand::silence_all(1, 2));
}
