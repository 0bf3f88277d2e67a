#![no_main]

use libfuzzer_sys::fuzz_target;
use shadowclass::{transform_class, File};

fuzz_target!(|data: &[u8]| {
    if let Ok(file) = File::from_mem(data.to_vec()) {
        let _ = transform_class(file.data());
    }
});
