#![no_main]

use cilprobe::{
    assembly::{Instruction, OpCode},
    rewriter::Method,
};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(mut method) = Method::decode(data) else {
        return;
    };

    // whatever decodes must survive an insertion and encode to something that decodes again
    let probe = [
        Instruction::with_operand(OpCode::LdcI4, 1),
        Instruction::with_operand(OpCode::Call, 0x0A00_0001),
    ];
    if let Some(first) = method.instructions().next().map(|i| i.original_offset()) {
        let _ = method.insert_at_original_offset(first, &probe);
    }

    let body = method.to_bytes().expect("sized buffer");
    Method::decode(&body).expect("rewritten body decodes");
});
