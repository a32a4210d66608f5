//! AT command formatting
//!
//! Commands are rendered into a fixed [`CommandBuffer`]. Text that would not
//! fit is cut off (with a warning) but the line terminator is always kept, so
//! an oversized command still ends the modem's input line.

use core::fmt::{self, Write};

use heapless::String;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::config::{Confirmation, DataRate, DeviceClass, JoinMode};

/// Size of the command buffer, terminator included.
pub const COMMAND_CAPACITY: usize = 200;

pub type CommandBuffer = String<COMMAND_CAPACITY>;

/// Terminator appended to every command.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnding {
    /// `\n`
    Lf,
    /// `\n\r`
    LfCr,
}

impl LineEnding {
    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::LfCr => "\n\r",
        }
    }
}

/// One command of the modem's AT dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtCommand<'a> {
    /// `AT`, wakes the modem
    Attention,
    /// `ATZ`, reboots the modem
    Reset,
    ChannelMask(&'a str),
    JoinMode(JoinMode),
    DeviceAddress(&'a str),
    /// `AT+DADDR=?`, reads the device address back
    QueryDeviceAddress,
    AppEui(&'a str),
    AppSessionKey(&'a str),
    NetworkSessionKey(&'a str),
    AdaptiveDataRate(bool),
    DataRate(DataRate),
    Class(DeviceClass),
    Confirmation(Confirmation),
    /// `AT+SENDB=<port>:<hex>`, payload hex encoded in upper case
    SendBinary { port: u8, payload: &'a [u8] },
    /// `AT+SEND=<port>:<text>`
    SendText { port: u8, text: &'a str },
}

impl AtCommand<'_> {
    /// Render the command followed by `ending`.
    pub fn format(&self, ending: LineEnding) -> CommandBuffer {
        let terminator = ending.as_str();
        let mut out = CommandBuffer::new();
        let mut writer = BoundedWriter {
            out: &mut out,
            limit: COMMAND_CAPACITY - terminator.len(),
            truncated: false,
        };
        // BoundedWriter never reports an error
        let _ = self.write_body(&mut writer);
        if writer.truncated {
            warn!(
                "AT command truncated to {} bytes",
                COMMAND_CAPACITY - terminator.len()
            );
        }
        let _ = out.push_str(terminator);
        out
    }

    fn write_body<W: Write>(&self, w: &mut W) -> fmt::Result {
        match *self {
            AtCommand::Attention => w.write_str("AT"),
            AtCommand::Reset => w.write_str("ATZ"),
            AtCommand::ChannelMask(mask) => write!(w, "AT+CHMASK={mask}"),
            AtCommand::JoinMode(mode) => write!(w, "AT+NJM={}", mode.code()),
            AtCommand::DeviceAddress(addr) => write!(w, "AT+DADDR={addr}"),
            AtCommand::QueryDeviceAddress => w.write_str("AT+DADDR=?"),
            AtCommand::AppEui(eui) => write!(w, "AT+APPEUI={eui}"),
            AtCommand::AppSessionKey(key) => write!(w, "AT+APPSKEY={key}"),
            AtCommand::NetworkSessionKey(key) => write!(w, "AT+NWKSKEY={key}"),
            AtCommand::AdaptiveDataRate(on) => write!(w, "AT+ADR={}", u8::from(on)),
            AtCommand::DataRate(dr) => write!(w, "AT+DR={}", dr.index()),
            AtCommand::Class(class) => write!(w, "AT+CLASS={}", class.letter()),
            AtCommand::Confirmation(cfm) => write!(w, "AT+CFM={}", cfm.code()),
            AtCommand::SendBinary { port, payload } => {
                write!(w, "AT+SENDB={port}:")?;
                for byte in payload {
                    write!(w, "{byte:02X}")?;
                }
                Ok(())
            }
            AtCommand::SendText { port, text } => write!(w, "AT+SEND={port}:{text}"),
        }
    }
}

/// `fmt::Write` sink that silently drops everything past `limit` bytes.
struct BoundedWriter<'b> {
    out: &'b mut CommandBuffer,
    limit: usize,
    truncated: bool,
}

impl Write for BoundedWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for c in s.chars() {
            if self.out.len() + c.len_utf8() > self.limit || self.out.push(c).is_err() {
                self.truncated = true;
                break;
            }
        }
        Ok(())
    }
}
