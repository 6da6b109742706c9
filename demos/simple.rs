use hexpatch::{PatchType, Pattern, Script, Session};

pub fn main() {
    let haystack = vec![
        0x11, 0x22, 0x33, 0x0, 0x0, 0x11, 0x22, 0x33, 0x11, 0x0, 0x33,
    ];
    let pattern = Pattern::from_hex("11 ?? 33").expect("Should be valid pattern");
    for (pos, view) in pattern.scan(&haystack) {
        println!("found needle at {} with bytes {:?}!", pos, view);
    }

    let mut session = Session::new(haystack);
    let patch = Pattern::parse("0xAA,0x??,0xBB", PatchType::Binary).expect("Should be valid patch");
    let report = session
        .patch_all(&pattern, &patch, Some(2), false)
        .expect("Should find the needle");
    println!("patched {:?}: {:02X?}", report.offsets, session.bytes());

    let script = Script::parse(
        "[Last]\nType=Binary\nMode=Single\nOffset=0x8\nOriginal=0x11,0x??,0x33\nPatch=0xCC,0x??,0xDD\n",
    )
    .expect("Should be valid script");
    script.run(&mut session, false).expect("Should apply");
    println!("after script: {:02X?}", session.bytes());
}
