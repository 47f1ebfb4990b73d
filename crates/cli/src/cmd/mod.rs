mod stage;
mod synth;
mod validate;

pub use stage::cmd_stage;
pub use synth::cmd_synth;
pub use validate::cmd_validate;
