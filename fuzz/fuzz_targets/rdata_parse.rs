#![no_main]
use libfuzzer_sys::fuzz_target;

use dns_types::protocol::types::DomainName;
use dns_types::zones::deserialise::parse_rdata;

fuzz_target!(|data: &str| {
    let origin = DomainName::from_dotted_string("example.com.").unwrap();
    let _ = parse_rdata(&origin, data);
});
