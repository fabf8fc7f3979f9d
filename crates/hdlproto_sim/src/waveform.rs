//! Waveform recording.
//!
//! The [`WaveformRecorder`] trait abstracts waveform output. [`VcdRecorder`]
//! writes the IEEE 1364 Value Change Dump format. Time is counted in
//! simulation steps: every half clock, stimulus, or reset advances it by one.

use std::collections::HashMap;
use std::io::Write;

use hdlproto_common::SignalId;

use crate::error::SimError;
use crate::signal::SignalKind;

/// Sink for signal declarations and value changes.
pub trait WaveformRecorder {
    /// Declares a signal inside the current scope.
    fn register_signal(
        &mut self,
        id: SignalId,
        name: &str,
        width: u32,
        kind: SignalKind,
    ) -> Result<(), SimError>;

    /// Opens a nested scope.
    fn begin_scope(&mut self, name: &str) -> Result<(), SimError>;

    /// Closes the current scope.
    fn end_scope(&mut self) -> Result<(), SimError>;

    /// Records the value of a signal at `time`.
    ///
    /// Times must be non-decreasing. The first recorded time is the initial
    /// dump.
    fn record_change(&mut self, time: u64, id: SignalId, value: u64) -> Result<(), SimError>;

    /// Flushes the output.
    fn finalize(&mut self) -> Result<(), SimError>;
}

/// VCD recorder writing to any [`Write`] sink.
///
/// Identifier codes are printable ASCII starting at `!`.
pub struct VcdRecorder<W: Write> {
    writer: W,
    codes: HashMap<SignalId, (String, u32)>,
    next_code: u32,
    header_written: bool,
    current_time: Option<u64>,
    in_dumpvars: bool,
}

impl<W: Write> VcdRecorder<W> {
    /// Creates a recorder writing to `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            codes: HashMap::new(),
            next_code: 0,
            header_written: false,
            current_time: None,
            in_dumpvars: false,
        }
    }

    /// Consumes the recorder and returns the sink.
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn ensure_header(&mut self) -> Result<(), SimError> {
        if self.header_written {
            return Ok(());
        }
        writeln!(self.writer, "$version")?;
        writeln!(self.writer, "  hdlproto simulator")?;
        writeln!(self.writer, "$end")?;
        writeln!(self.writer, "$timescale")?;
        writeln!(self.writer, "  1ns")?;
        writeln!(self.writer, "$end")?;
        self.header_written = true;
        Ok(())
    }

    fn make_id_code(index: u32) -> String {
        let mut result = String::new();
        let mut idx = index;
        loop {
            result.push((b'!' + (idx % 94) as u8) as char);
            idx /= 94;
            if idx == 0 {
                break;
            }
            idx -= 1;
        }
        result
    }

    fn format_value(value: u64, width: u32) -> String {
        if width == 1 {
            (value & 1).to_string()
        } else {
            format!("b{value:b}")
        }
    }

    /// VCD references cannot carry `[i]` as part of a name.
    fn reference(name: &str) -> String {
        name.replace('[', "(").replace(']', ")")
    }
}

impl<W: Write> WaveformRecorder for VcdRecorder<W> {
    fn register_signal(
        &mut self,
        id: SignalId,
        name: &str,
        width: u32,
        kind: SignalKind,
    ) -> Result<(), SimError> {
        self.ensure_header()?;
        let code = Self::make_id_code(self.next_code);
        self.next_code += 1;
        let var = match kind {
            SignalKind::Wire => "wire",
            SignalKind::Reg => "reg",
        };
        writeln!(
            self.writer,
            "$var {var} {width} {code} {} $end",
            Self::reference(name)
        )?;
        self.codes.insert(id, (code, width));
        Ok(())
    }

    fn begin_scope(&mut self, name: &str) -> Result<(), SimError> {
        self.ensure_header()?;
        writeln!(self.writer, "$scope module {name} $end")?;
        Ok(())
    }

    fn end_scope(&mut self) -> Result<(), SimError> {
        writeln!(self.writer, "$upscope $end")?;
        Ok(())
    }

    fn record_change(&mut self, time: u64, id: SignalId, value: u64) -> Result<(), SimError> {
        self.ensure_header()?;
        match self.current_time {
            None => {
                writeln!(self.writer, "$enddefinitions $end")?;
                writeln!(self.writer, "#{time}")?;
                writeln!(self.writer, "$dumpvars")?;
                self.in_dumpvars = true;
                self.current_time = Some(time);
            }
            Some(t) if t != time => {
                if self.in_dumpvars {
                    writeln!(self.writer, "$end")?;
                    self.in_dumpvars = false;
                }
                writeln!(self.writer, "#{time}")?;
                self.current_time = Some(time);
            }
            Some(_) => {}
        }
        let (code, width) = self
            .codes
            .get(&id)
            .ok_or_else(|| SimError::config(format!("unregistered waveform signal {id}")))?;
        let value = Self::format_value(value, *width);
        if *width == 1 {
            writeln!(self.writer, "{value}{code}")?;
        } else {
            writeln!(self.writer, "{value} {code}")?;
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), SimError> {
        self.ensure_header()?;
        if self.current_time.is_none() {
            writeln!(self.writer, "$enddefinitions $end")?;
            self.current_time = Some(0);
        }
        if self.in_dumpvars {
            writeln!(self.writer, "$end")?;
            self.in_dumpvars = false;
        }
        self.writer.flush()?;
        Ok(())
    }
}
