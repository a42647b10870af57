// Extraction backends

pub mod python;
pub mod tikwm;
pub mod ytdlp;

pub use python::PythonYtDlp;
pub use tikwm::TikWmBackend;
pub use ytdlp::YtDlpBackend;
