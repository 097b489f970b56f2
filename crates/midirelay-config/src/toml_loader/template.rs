//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# midirelay configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[server]
# bind_host = "0.0.0.0"
# port = 8080            # 1-65535

[client]
# host = "localhost"     # loopback hosts connect over ws://, others over wss://
# port = 8080            # defaults to 8080 on loopback, scheme default elsewhere
# secure = true          # force wss:// (true) or ws:// (false)

[logging]
# level = "info"         # debug, info, warn, error
"##
    .to_string()
}
