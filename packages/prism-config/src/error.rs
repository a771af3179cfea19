pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Cannot read Prism config {path:?}: {source}")]
	ReadConfig { path: std::path::PathBuf, source: std::io::Error },
	#[error("Cannot parse Prism config {path:?}: {source}")]
	ParseConfig { path: std::path::PathBuf, source: toml::de::Error },
	/// A config value is out of range; `message` names the key.
	#[error("{message}")]
	Validation { message: String },
}
