// Feetech STS-series serial bus
//
// Frame layout: [0xFF, 0xFF, ID, Length, Instruction, Params..., Checksum]
// Length counts instruction + params + checksum, checksum is !sum(ID..params).
// The drive runs the servos in open-loop PWM mode, where the signed output is
// written to the Goal Time register.

use serialport::SerialPort;
use std::io::{Read, Write};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BAUDRATE: u32 = 1_000_000;
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// ID every servo listens to (sync writes)
pub const BROADCAST_ID: u8 = 0xFE;

/// Largest magnitude accepted by the Goal Time register in PWM mode
pub const PWM_RANGE: i16 = 1000;

/// Amps per unit of the current registers
pub const CURRENT_UNIT_AMPS: f64 = 0.0065;

const HEADER: [u8; 2] = [0xFF, 0xFF];

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Instruction {
    Ping = 0x01,
    Read = 0x02,
    Write = 0x03,
    SyncWrite = 0x83,
}

/// Control table addresses used by the drive
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Register {
    ProtectionCurrent = 28,   // 2 bytes, 6.5 mA per unit
    OperatingMode = 33,       // 1 byte
    ProtectiveTorque = 34,    // 1 byte, % of max torque once protection trips
    OverCurrentTime = 38,     // 1 byte, 10 ms per unit
    TorqueEnable = 40,        // 1 byte
    GoalTime = 44,            // 2 bytes, signed PWM in PWM mode
    Lock = 55,                // 1 byte
    PresentCurrent = 69,      // 2 bytes, read-only
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OperatingMode {
    Pwm = 2,
}

#[derive(Debug, thiserror::Error)]
pub enum FeetechError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid response from servo {id}: {reason}")]
    InvalidResponse { id: u8, reason: String },

    #[error("Checksum mismatch for servo {id}")]
    ChecksumMismatch { id: u8 },

    #[error("Servo {id} reported status 0x{status:02X}")]
    ServoStatus { id: u8, status: u8 },

    #[error("Timeout waiting for servo {id}")]
    Timeout { id: u8 },
}

pub type Result<T> = std::result::Result<T, FeetechError>;

/// Checksum over everything after the header
pub fn checksum(data: &[u8]) -> u8 {
    let sum = data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    !sum
}

/// Frame an instruction for one servo (or the broadcast ID)
pub fn encode_frame(id: u8, instruction: Instruction, params: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(HEADER.len() + 4 + params.len());
    frame.extend_from_slice(&HEADER);
    frame.push(id);
    frame.push((params.len() + 2) as u8);
    frame.push(instruction as u8);
    frame.extend_from_slice(params);
    frame.push(checksum(&frame[HEADER.len()..]));
    frame
}

/// Bit 15 carries the sign, bits 0-14 the magnitude
pub fn encode_sign_magnitude(value: i16) -> u16 {
    let magnitude = value.unsigned_abs() & 0x7FFF;
    if value < 0 { 0x8000 | magnitude } else { magnitude }
}

pub fn decode_sign_magnitude(raw: u16) -> i16 {
    let magnitude = (raw & 0x7FFF) as i16;
    if raw & 0x8000 != 0 { -magnitude } else { magnitude }
}

/// Servo bus over any byte transport (a serial port in production)
pub struct FeetechBus<T = Box<dyn SerialPort>> {
    port: T,
}

impl FeetechBus {
    pub fn open(port_name: &str) -> Result<Self> {
        Self::open_with_baudrate(port_name, DEFAULT_BAUDRATE)
    }

    pub fn open_with_baudrate(port_name: &str, baudrate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;
        Ok(Self { port })
    }
}

impl<T: Read + Write> FeetechBus<T> {
    pub fn with_transport(port: T) -> Self {
        Self { port }
    }

    pub fn transport(&self) -> &T {
        &self.port
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.port
    }

    fn send(&mut self, frame: &[u8]) -> Result<()> {
        self.port.write_all(frame)?;
        self.port.flush()?;
        Ok(())
    }

    fn read_exact_or_timeout(&mut self, buf: &mut [u8], id: u8) -> Result<()> {
        self.port.read_exact(buf).map_err(|e| match e.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::UnexpectedEof => {
                FeetechError::Timeout { id }
            }
            _ => FeetechError::Io(e),
        })
    }

    /// Read a status frame and return its parameters
    fn read_status(&mut self, expected_id: u8) -> Result<Vec<u8>> {
        let mut head = [0u8; 4];
        self.read_exact_or_timeout(&mut head, expected_id)?;

        if head[..2] != HEADER {
            return Err(FeetechError::InvalidResponse {
                id: expected_id,
                reason: format!("bad header {:02X?}", &head[..2]),
            });
        }
        let (id, length) = (head[2], head[3] as usize);
        if id != expected_id {
            return Err(FeetechError::InvalidResponse {
                id: expected_id,
                reason: format!("answer came from servo {}", id),
            });
        }
        if length < 2 {
            return Err(FeetechError::InvalidResponse {
                id,
                reason: format!("length {} too short", length),
            });
        }

        // status byte + params + checksum
        let mut body = vec![0u8; length];
        self.read_exact_or_timeout(&mut body, id)?;

        let (payload, received) = body.split_at(length - 1);
        let mut covered = vec![id, length as u8];
        covered.extend_from_slice(payload);
        if checksum(&covered) != received[0] {
            return Err(FeetechError::ChecksumMismatch { id });
        }

        if payload[0] != 0 {
            return Err(FeetechError::ServoStatus {
                id,
                status: payload[0],
            });
        }
        Ok(payload[1..].to_vec())
    }

    /// True when the servo answers
    pub fn ping(&mut self, id: u8) -> Result<bool> {
        self.send(&encode_frame(id, Instruction::Ping, &[]))?;
        match self.read_status(id) {
            Ok(_) => Ok(true),
            Err(FeetechError::Timeout { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn write_u8(&mut self, id: u8, register: Register, value: u8) -> Result<()> {
        debug!("Servo {} <- {:?} = {}", id, register, value);
        self.send(&encode_frame(id, Instruction::Write, &[register as u8, value]))?;
        self.read_status(id).map(|_| ())
    }

    pub fn write_u16(&mut self, id: u8, register: Register, value: u16) -> Result<()> {
        debug!("Servo {} <- {:?} = {}", id, register, value);
        let [lo, hi] = value.to_le_bytes();
        self.send(&encode_frame(id, Instruction::Write, &[register as u8, lo, hi]))?;
        self.read_status(id).map(|_| ())
    }

    pub fn read_u16(&mut self, id: u8, register: Register) -> Result<u16> {
        self.send(&encode_frame(id, Instruction::Read, &[register as u8, 2]))?;
        let params = self.read_status(id)?;
        match params.as_slice() {
            [lo, hi, ..] => Ok(u16::from_le_bytes([*lo, *hi])),
            _ => Err(FeetechError::InvalidResponse {
                id,
                reason: format!("expected 2 bytes, got {}", params.len()),
            }),
        }
    }

    /// Write one 16-bit register on several servos in a single broadcast frame.
    /// Servos do not answer sync writes.
    pub fn sync_write_u16(&mut self, register: Register, data: &[(u8, u16)]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }

        let mut params = Vec::with_capacity(2 + data.len() * 3);
        params.push(register as u8);
        params.push(2);
        for &(id, value) in data {
            let [lo, hi] = value.to_le_bytes();
            params.extend_from_slice(&[id, lo, hi]);
        }

        self.send(&encode_frame(BROADCAST_ID, Instruction::SyncWrite, &params))
    }

    /// Signed PWM to several servos, clamped to `PWM_RANGE`
    pub fn sync_write_pwm(&mut self, data: &[(u8, i16)]) -> Result<()> {
        let encoded: Vec<(u8, u16)> = data
            .iter()
            .map(|&(id, pwm)| (id, encode_sign_magnitude(pwm.clamp(-PWM_RANGE, PWM_RANGE))))
            .collect();
        self.sync_write_u16(Register::GoalTime, &encoded)
    }

    /// Enable torque and lock the EEPROM
    pub fn enable_torque(&mut self, id: u8) -> Result<()> {
        self.write_u8(id, Register::TorqueEnable, 1)?;
        self.write_u8(id, Register::Lock, 1)
    }

    pub fn disable_torque(&mut self, id: u8) -> Result<()> {
        self.write_u8(id, Register::TorqueEnable, 0)?;
        self.write_u8(id, Register::Lock, 0)
    }

    /// Torque has to be off while switching modes
    pub fn set_operating_mode(&mut self, id: u8, mode: OperatingMode) -> Result<()> {
        self.write_u8(id, Register::OperatingMode, mode as u8)
    }

    /// Present current draw in amps
    pub fn present_current(&mut self, id: u8) -> Result<f64> {
        let raw = self.read_u16(id, Register::PresentCurrent)?;
        Ok(decode_sign_magnitude(raw).unsigned_abs() as f64 * CURRENT_UNIT_AMPS)
    }
}
