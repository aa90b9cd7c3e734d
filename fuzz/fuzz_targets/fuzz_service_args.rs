#![no_main]

use libfuzzer_sys::fuzz_target;

use domain::rule::args::LbServiceArgs;

// Service requests as they arrive on the REST API: JSON decode then
// validation, which normalizes endpoint weights.
fuzz_target!(|data: &[u8]| {
    if data.len() > 16 * 1024 {
        return;
    }
    let Ok(args) = serde_json::from_slice::<LbServiceArgs>(data) else {
        return;
    };
    let _ = args.service_tuple();
    let _ = args.validate();
});
