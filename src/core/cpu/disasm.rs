//! Disassembler for the `/disassembly` RPC endpoint (SPEC_FULL.md C2 / §6.1).
//!
//! Grounded on `examples/abbruzze-r-ps1/src/core/cpu/disassembler.rs`: the
//! `Disassembled { address, opcode, parameters, formatted }` record shape and
//! the register-alias table, adapted from MIPS register names to ARM's
//! r0-r15 (with sp/lr/pc aliases for r13-r15).

use super::instruction::{decode, BlockTransfer, Branch, DataProcessing, Decoded, DpOp, Multiply, Operand2, ShiftKind, SingleTransfer, SoftwareInterrupt, TransferOffset};

#[derive(Debug, Clone)]
pub struct Disassembled {
    pub address: u32,
    pub raw: u32,
    pub mnemonic: String,
    pub formatted: String,
}

pub fn register_alias(index: u8) -> String {
    match index {
        13 => "sp".to_string(),
        14 => "lr".to_string(),
        15 => "pc".to_string(),
        n => format!("r{n}"),
    }
}

const CONDITION_SUFFIX: [&str; 15] = [
    "eq", "ne", "cs", "cc", "mi", "pl", "vs", "vc", "hi", "ls", "ge", "lt", "gt", "le", "",
];

fn cond_suffix(cond: u8) -> &'static str {
    if cond == 0xF {
        "nv"
    } else {
        CONDITION_SUFFIX[cond as usize]
    }
}

fn dp_mnemonic(op: DpOp) -> &'static str {
    match op {
        DpOp::And => "and",
        DpOp::Eor => "eor",
        DpOp::Sub => "sub",
        DpOp::Rsb => "rsb",
        DpOp::Add => "add",
        DpOp::Adc => "adc",
        DpOp::Sbc => "sbc",
        DpOp::Rsc => "rsc",
        DpOp::Tst => "tst",
        DpOp::Teq => "teq",
        DpOp::Cmp => "cmp",
        DpOp::Cmn => "cmn",
        DpOp::Orr => "orr",
        DpOp::Mov => "mov",
        DpOp::Bic => "bic",
        DpOp::Mvn => "mvn",
    }
}

fn shift_mnemonic(kind: ShiftKind) -> &'static str {
    match kind {
        ShiftKind::Lsl => "lsl",
        ShiftKind::Lsr => "lsr",
        ShiftKind::Asr => "asr",
        ShiftKind::Ror => "ror",
    }
}

fn format_operand2(op2: Operand2) -> String {
    match op2 {
        Operand2::Immediate { value, .. } => format!("#{value}"),
        Operand2::Register(r) => {
            let base = register_alias(r.rm);
            match r.amount {
                super::instruction::ShiftAmount::Immediate(0) if matches!(r.kind, ShiftKind::Lsl) => base,
                super::instruction::ShiftAmount::Immediate(0) if matches!(r.kind, ShiftKind::Ror) => {
                    format!("{base}, rrx")
                }
                super::instruction::ShiftAmount::Immediate(n) => format!("{base}, {} #{n}", shift_mnemonic(r.kind)),
                super::instruction::ShiftAmount::Register(rs) => {
                    format!("{base}, {} {}", shift_mnemonic(r.kind), register_alias(rs))
                }
            }
        }
    }
}

fn format_data_processing(d: DataProcessing) -> (String, String) {
    let mnemonic = format!("{}{}{}", dp_mnemonic(d.op), cond_suffix(d.cond), if d.s { "s" } else { "" });
    let formatted = if d.op.writes_result() {
        format!("{} {}, {}, {}", mnemonic, register_alias(d.rd), register_alias(d.rn), format_operand2(d.operand2))
    } else if matches!(d.op, DpOp::Mov | DpOp::Mvn) {
        format!("{} {}, {}", mnemonic, register_alias(d.rd), format_operand2(d.operand2))
    } else {
        format!("{} {}, {}", mnemonic, register_alias(d.rn), format_operand2(d.operand2))
    };
    (mnemonic, formatted)
}

fn format_multiply(m: Multiply) -> (String, String) {
    let base = if m.accumulate { "mla" } else { "mul" };
    let mnemonic = format!("{base}{}{}", cond_suffix(m.cond), if m.s { "s" } else { "" });
    let formatted = if m.accumulate {
        format!(
            "{} {}, {}, {}, {}",
            mnemonic,
            register_alias(m.rd),
            register_alias(m.rm),
            register_alias(m.rs),
            register_alias(m.rn)
        )
    } else {
        format!("{} {}, {}, {}", mnemonic, register_alias(m.rd), register_alias(m.rm), register_alias(m.rs))
    };
    (mnemonic, formatted)
}

fn format_single_transfer(s: SingleTransfer) -> (String, String) {
    let base = if s.load { "ldr" } else { "str" };
    let mnemonic = format!("{base}{}{}", cond_suffix(s.cond), if s.byte { "b" } else { "" });
    let sign = if s.add_offset { "" } else { "-" };
    let offset = match s.offset {
        TransferOffset::Immediate(0) => String::new(),
        TransferOffset::Immediate(v) => format!(", #{sign}{v}"),
        TransferOffset::Register(r) => format!(", {sign}{}", format_operand2(Operand2::Register(r))),
    };
    let addr = if s.pre_index {
        let wb = if s.writeback { "!" } else { "" };
        format!("[{}{}]{}", register_alias(s.rn), offset, wb)
    } else {
        format!("[{}]{}", register_alias(s.rn), offset)
    };
    let formatted = format!("{} {}, {}", mnemonic, register_alias(s.rd), addr);
    (mnemonic, formatted)
}

fn format_block_transfer(b: BlockTransfer) -> (String, String) {
    let base = if b.load { "ldm" } else { "stm" };
    let mode = match (b.pre_index, b.add_offset) {
        (false, true) => "ia",
        (true, true) => "ib",
        (false, false) => "da",
        (true, false) => "db",
    };
    let mnemonic = format!("{base}{mode}{}", cond_suffix(b.cond));
    let regs: Vec<String> = (0..16u8).filter(|i| b.register_list & (1 << i) != 0).map(register_alias).collect();
    let wb = if b.writeback { "!" } else { "" };
    let formatted = format!("{} {}{}, {{{}}}", mnemonic, register_alias(b.rn), wb, regs.join(", "));
    (mnemonic, formatted)
}

fn format_branch(b: Branch, addr: u32) -> (String, String) {
    let base = if b.link { "bl" } else { "b" };
    let mnemonic = format!("{base}{}", cond_suffix(b.cond));
    let target = (addr.wrapping_add(8) as i64 + b.offset as i64) as u32;
    let formatted = format!("{mnemonic} {target:#010x}");
    (mnemonic, formatted)
}

fn format_swi(s: SoftwareInterrupt) -> (String, String) {
    let mnemonic = format!("swi{}", cond_suffix(s.cond));
    (mnemonic.clone(), format!("{mnemonic} {:#x}", s.imm))
}

/// Disassemble one word at `addr`. Illegal encodings still produce a record
/// (mnemonic `"???"`) rather than an error, since a disassembly listing must
/// cover data that happens to sit in the code segment.
pub fn disassemble(addr: u32, word: u32) -> Disassembled {
    match decode(addr, word) {
        Ok(Decoded::DataProcessing(d)) => {
            let (mnemonic, formatted) = format_data_processing(d);
            Disassembled { address: addr, raw: word, mnemonic, formatted }
        }
        Ok(Decoded::Multiply(m)) => {
            let (mnemonic, formatted) = format_multiply(m);
            Disassembled { address: addr, raw: word, mnemonic, formatted }
        }
        Ok(Decoded::SingleTransfer(s)) => {
            let (mnemonic, formatted) = format_single_transfer(s);
            Disassembled { address: addr, raw: word, mnemonic, formatted }
        }
        Ok(Decoded::BlockTransfer(b)) => {
            let (mnemonic, formatted) = format_block_transfer(b);
            Disassembled { address: addr, raw: word, mnemonic, formatted }
        }
        Ok(Decoded::Branch(b)) => {
            let (mnemonic, formatted) = format_branch(b, addr);
            Disassembled { address: addr, raw: word, mnemonic, formatted }
        }
        Ok(Decoded::SoftwareInterrupt(s)) => {
            let (mnemonic, formatted) = format_swi(s);
            Disassembled { address: addr, raw: word, mnemonic, formatted }
        }
        Err(_) => Disassembled {
            address: addr,
            raw: word,
            mnemonic: "???".to_string(),
            formatted: format!("??? {word:#010x}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disassembles_mov_immediate() {
        let word = (0xEu32 << 28) | (1 << 25) | (0b1101 << 21) | (0 << 16) | (0 << 12) | 42;
        let d = disassemble(0x8000, word);
        assert_eq!(d.mnemonic, "mov");
        assert_eq!(d.formatted, "mov r0, #42");
    }

    #[test]
    fn disassembles_conditional_branch_link() {
        let word = (0x1u32 << 28) | (0b101 << 25) | (1 << 24) | 0x10;
        let d = disassemble(0x8000, word);
        assert_eq!(d.mnemonic, "blne");
        assert_eq!(d.formatted, "blne 0x00008048");
    }

    #[test]
    fn unknown_encoding_is_question_marks() {
        let word = (0xEu32 << 28) | (0b110u32 << 25);
        let d = disassemble(0, word);
        assert_eq!(d.mnemonic, "???");
    }
}
