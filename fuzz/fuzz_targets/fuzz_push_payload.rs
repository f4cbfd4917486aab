#![no_main]

use connect4_client::drop_target::DropTargets;
use connect4_client::protocol::decode_snapshot;
use connect4_client::turn::resolve_next_player;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // Both encodings go through the same entry point.
    let Ok(snapshot) = decode_snapshot(text) else {
        return;
    };

    // Anything that decodes must be safe to derive from.
    let _ = resolve_next_player(&snapshot);
    let targets = DropTargets::new(&snapshot.board);
    for col in 0..=snapshot.board.width() {
        let _ = targets.landing_row(col);
    }

    let wrapped = serde_json::to_string(text).unwrap_or_default();
    if let Ok(again) = decode_snapshot(&wrapped) {
        assert_eq!(again, snapshot);
    }
});
