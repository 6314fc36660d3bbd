//! Built-in nodes: device audio input/output, MIDI input, and a gain utility.

use super::{Instance, PluginDescription, PluginError, PluginFormat};
use crate::graph::NodeKind;
use crate::port::{PortRange, PortType};
use crate::processor::{PortBuffers, Processor, RunContext};

/// Format name of the built-in nodes.
pub const INTERNAL_FORMAT: &str = "Internal";
/// Device audio input node.
pub const AUDIO_INPUT_ID: &str = "audio.input";
/// Device audio output node.
pub const AUDIO_OUTPUT_ID: &str = "audio.output";
/// Device MIDI input node.
pub const MIDI_INPUT_ID: &str = "midi.input";
/// Stereo-or-wider gain stage.
pub const GAIN_ID: &str = "util.gain";

const GAIN_CHANNELS: u32 = 2;

/// Widest channel count an internal node accepts.
pub const MAX_CHANNELS: u32 = 64;

/// Internal plugin format. Channel counts follow the audio device.
#[derive(Clone, Copy, Debug)]
pub struct InternalFormat {
    input_channels: u32,
    output_channels: u32,
}

impl InternalFormat {
    /// Format for a device with the given channel counts.
    pub fn new(input_channels: u32, output_channels: u32) -> Self {
        Self {
            input_channels,
            output_channels,
        }
    }
}

impl PluginFormat for InternalFormat {
    fn name(&self) -> &str {
        INTERNAL_FORMAT
    }

    fn descriptions(&self) -> Vec<PluginDescription> {
        vec![
            PluginDescription::new(
                "Audio Input",
                INTERNAL_FORMAT,
                AUDIO_INPUT_ID,
                0,
                self.input_channels,
            ),
            PluginDescription::new(
                "Audio Output",
                INTERNAL_FORMAT,
                AUDIO_OUTPUT_ID,
                self.output_channels,
                0,
            ),
            PluginDescription::new("MIDI Input", INTERNAL_FORMAT, MIDI_INPUT_ID, 0, 0),
            PluginDescription::new(
                "Gain",
                INTERNAL_FORMAT,
                GAIN_ID,
                GAIN_CHANNELS,
                GAIN_CHANNELS,
            ),
        ]
    }

    fn instantiate(
        &self,
        description: &PluginDescription,
        _sample_rate: f64,
        _block_size: usize,
    ) -> Result<Instance, PluginError> {
        if self.input_channels > MAX_CHANNELS || self.output_channels > MAX_CHANNELS {
            return Err(PluginError::Instantiate(format!(
                "device has {}/{} channels, at most {MAX_CHANNELS} supported",
                self.input_channels, self.output_channels
            )));
        }
        let (processor, kind): (Box<dyn Processor>, NodeKind) =
            match description.identifier.as_str() {
                AUDIO_INPUT_ID => (
                    Box::new(IoNode::new(0, self.input_channels, false)),
                    NodeKind::AudioInput,
                ),
                AUDIO_OUTPUT_ID => (
                    Box::new(IoNode::new(self.output_channels, 0, false)),
                    NodeKind::AudioOutput,
                ),
                MIDI_INPUT_ID => (Box::new(IoNode::new(0, 0, true)), NodeKind::MidiInput),
                GAIN_ID => {
                    let channels = if description.num_inputs == 0 {
                        GAIN_CHANNELS
                    } else {
                        description.num_inputs
                    };
                    if channels > MAX_CHANNELS {
                        return Err(PluginError::Instantiate(format!(
                            "gain supports at most {MAX_CHANNELS} channels, got {channels}"
                        )));
                    }
                    if description.num_outputs != 0 && description.num_outputs != channels {
                        return Err(PluginError::Instantiate(format!(
                            "gain needs matching channel counts, got {}/{}",
                            description.num_inputs, description.num_outputs
                        )));
                    }
                    (Box::new(Gain::new(channels)), NodeKind::Plugin)
                }
                other => {
                    return Err(PluginError::NotFound {
                        format: INTERNAL_FORMAT.into(),
                        identifier: other.into(),
                    });
                }
            };
        Ok(Instance { processor, kind })
    }
}

/// Pass-through endpoint. The graph player fills its outputs or reads its
/// inputs; `run` itself does nothing.
struct IoNode {
    inputs: u32,
    outputs: u32,
    midi: bool,
}

impl IoNode {
    fn new(inputs: u32, outputs: u32, midi: bool) -> Self {
        Self {
            inputs,
            outputs,
            midi,
        }
    }
}

impl Processor for IoNode {
    fn num_ports(&self) -> u32 {
        self.inputs + self.outputs + u32::from(self.midi)
    }

    fn port_type(&self, index: u32) -> PortType {
        if index < self.inputs + self.outputs {
            PortType::Audio
        } else if self.midi && index == self.inputs + self.outputs {
            PortType::Midi
        } else {
            PortType::Unknown
        }
    }

    fn is_port_input(&self, index: u32) -> bool {
        index < self.inputs
    }

    fn port_symbol(&self, index: u32) -> String {
        if index < self.inputs {
            format!("in_{}", index + 1)
        } else if index < self.inputs + self.outputs {
            format!("out_{}", index - self.inputs + 1)
        } else {
            "midi_out".into()
        }
    }

    fn run(&mut self, _ports: &mut PortBuffers, _context: &mut RunContext<'_>) {}
}

/// `channels` audio inputs, `channels` audio outputs, then one `gain` control.
struct Gain {
    channels: u32,
}

impl Gain {
    fn new(channels: u32) -> Self {
        Self { channels }
    }

    fn gain_port(&self) -> u32 {
        self.channels * 2
    }
}

impl Processor for Gain {
    fn num_ports(&self) -> u32 {
        self.channels * 2 + 1
    }

    fn port_type(&self, index: u32) -> PortType {
        match index {
            i if i < self.channels * 2 => PortType::Audio,
            i if i == self.gain_port() => PortType::Control,
            _ => PortType::Unknown,
        }
    }

    fn is_port_input(&self, index: u32) -> bool {
        index < self.channels || index == self.gain_port()
    }

    fn port_symbol(&self, index: u32) -> String {
        if index < self.channels {
            format!("in_{}", index + 1)
        } else if index < self.channels * 2 {
            format!("out_{}", index - self.channels + 1)
        } else {
            "gain".into()
        }
    }

    fn port_name(&self, index: u32) -> String {
        if index == self.gain_port() {
            "Gain".into()
        } else {
            self.port_symbol(index)
        }
    }

    fn port_range(&self, index: u32) -> PortRange {
        if index == self.gain_port() {
            PortRange::new(0.0, 4.0, 1.0)
        } else {
            PortRange::default()
        }
    }

    fn run(&mut self, ports: &mut PortBuffers, context: &mut RunContext<'_>) {
        let gain = ports.control(self.gain_port());
        let frames = context.frames;
        for ch in 0..self.channels {
            if let Some((input, output)) = ports.audio_in_out(ch, ch + self.channels) {
                let n = frames.min(input.len()).min(output.len());
                for (o, i) in output[..n].iter_mut().zip(&input[..n]) {
                    *o = i * gain;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::ProcessContext;

    fn instantiate(format: &InternalFormat, id: &str) -> Instance {
        let desc = format
            .descriptions()
            .into_iter()
            .find(|d| d.identifier == id)
            .unwrap();
        format.instantiate(&desc, 48000.0, 64).unwrap()
    }

    #[test]
    fn test_io_node_layouts() {
        let format = InternalFormat::new(1, 2);

        let input = instantiate(&format, AUDIO_INPUT_ID);
        assert_eq!(input.kind, NodeKind::AudioInput);
        assert_eq!(input.processor.num_ports(), 1);
        assert!(!input.processor.is_port_input(0));

        let output = instantiate(&format, AUDIO_OUTPUT_ID);
        assert_eq!(output.kind, NodeKind::AudioOutput);
        assert_eq!(output.processor.num_ports(), 2);
        assert!(output.processor.is_port_input(1));

        let midi = instantiate(&format, MIDI_INPUT_ID);
        assert_eq!(midi.kind, NodeKind::MidiInput);
        assert_eq!(midi.processor.port_type(0), PortType::Midi);
        assert_eq!(midi.processor.port_symbol(0), "midi_out");
    }

    #[test]
    fn test_gain_scales_audio() {
        let format = InternalFormat::new(2, 2);
        let mut gain = instantiate(&format, GAIN_ID);
        assert_eq!(gain.kind, NodeKind::Plugin);
        let p = &mut gain.processor;
        assert_eq!(p.port_symbol(4), "gain");
        assert_eq!(p.port_range(4).default, 1.0);

        let types: Vec<PortType> = (0..p.num_ports()).map(|i| p.port_type(i)).collect();
        let mut ports = PortBuffers::new(&types, 8, 0);
        ports.audio_mut(0).fill(0.5);
        ports.audio_mut(1).fill(-1.0);
        ports.set_control(4, 2.0);
        p.run(&mut ports, &mut RunContext::new(ProcessContext::new(0, 8), None));
        assert_eq!(ports.audio(2), &[1.0; 8]);
        assert_eq!(ports.audio(3), &[-2.0; 8]);
    }

    #[test]
    fn test_gain_rejects_mismatched_channels() {
        let format = InternalFormat::new(2, 2);
        let desc = PluginDescription::new("Gain", INTERNAL_FORMAT, GAIN_ID, 2, 3);
        assert!(matches!(
            format.instantiate(&desc, 48000.0, 64),
            Err(PluginError::Instantiate(_))
        ));
    }

    #[test]
    fn test_gain_rejects_huge_channel_count() {
        let format = InternalFormat::new(2, 2);
        let desc = PluginDescription::new(
            "Gain",
            INTERNAL_FORMAT,
            GAIN_ID,
            3_000_000_000,
            3_000_000_000,
        );
        let Err(PluginError::Instantiate(reason)) = format.instantiate(&desc, 48000.0, 64) else {
            panic!("expected an instantiate error");
        };
        assert!(reason.contains("at most 64"), "got: {reason}");

        let widest =
            PluginDescription::new("Gain", INTERNAL_FORMAT, GAIN_ID, MAX_CHANNELS, MAX_CHANNELS);
        let gain = format.instantiate(&widest, 48000.0, 64).unwrap();
        assert_eq!(gain.processor.num_ports(), MAX_CHANNELS * 2 + 1);
    }

    #[test]
    fn test_rejects_oversized_device() {
        let format = InternalFormat::new(2, 1000);
        let desc = PluginDescription::new("Out", INTERNAL_FORMAT, AUDIO_OUTPUT_ID, 0, 0);
        assert!(matches!(
            format.instantiate(&desc, 48000.0, 64),
            Err(PluginError::Instantiate(_))
        ));
    }
}
