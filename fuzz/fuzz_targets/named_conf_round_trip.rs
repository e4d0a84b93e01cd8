#![no_main]
use libfuzzer_sys::fuzz_target;

use easybind::named_conf::NamedConf;

fuzz_target!(|data: &str| {
    let conf = NamedConf::parse(data);
    assert_eq!(data, conf.serialise());
    assert_eq!(conf, NamedConf::parse(&conf.serialise()));
});
