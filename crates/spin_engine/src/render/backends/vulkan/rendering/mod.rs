// Render pass, pipeline and command recording

pub mod commands;
pub mod render_pass;
pub mod shader;

pub use commands::*;
pub use render_pass::*;
pub use shader::*;
