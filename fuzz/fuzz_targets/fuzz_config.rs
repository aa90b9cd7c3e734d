#![no_main]

use libfuzzer_sys::fuzz_target;

use infrastructure::config::AgentConfig;

// Arbitrary YAML through deserialization and section validation,
// including the static rule lists. Must only return Ok or Err.
fuzz_target!(|data: &[u8]| {
    if let Ok(yaml) = std::str::from_utf8(data)
        && yaml.len() <= 64 * 1024
    {
        let _ = AgentConfig::from_yaml(yaml);
    }
});
