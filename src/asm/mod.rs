//! Assembler: source text to a program image.
use std::{collections::BTreeMap, fmt::Display};

use anyhow::{bail, Context, Result};
use pest::{iterators::Pair, Parser};
use pest_derive::Parser;

use crate::{
    codec::Instruction,
    isa::{cond_fn, op_code, reg_code, OpClass},
    utils::parse_literal,
};

#[derive(Parser)]
#[grammar = "src/asm/grammar.pest"]
pub struct AsmParser;

pub fn parse(src: &str) -> Result<pest::iterators::Pairs<'_, Rule>> {
    let main = AsmParser::parse(Rule::main, src)
        .context("fail to parse assembly source")?
        .next()
        .context("empty parse tree")?;
    Ok(main.into_inner())
}

pub type SymbolMap = BTreeMap<String, u64>;

/// Largest program image the assembler produces, in bytes.
pub const MAX_IMAGE: u64 = 1 << 20;

#[derive(Default)]
pub struct AssembleOption {
    verbose: bool,
}

impl AssembleOption {
    pub fn set_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// Immediate values (can be raw number or address of label)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Imm {
    Num(i64),
    Label(String),
}

impl Imm {
    fn resolve(&self, sym: &SymbolMap) -> Result<i64> {
        match self {
            Imm::Num(n) => Ok(*n),
            Imm::Label(label) => sym
                .get(label)
                .map(|&a| a as i64)
                .with_context(|| format!("undefined label `{label}`")),
        }
    }
}

/// An instruction whose immediate may still name a label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsmInst {
    pub class: OpClass,
    pub ifun: u8,
    pub ra: u8,
    pub rb: u8,
    pub imm: Option<Imm>,
}

impl AsmInst {
    fn new(class: OpClass, ifun: u8, ra: u8, rb: u8, imm: Option<Imm>) -> Self {
        Self {
            class,
            ifun,
            ra,
            rb,
            imm,
        }
    }

    fn resolve(&self, sym: &SymbolMap) -> Result<Instruction> {
        let valc = match &self.imm {
            Some(imm) => imm.resolve(sym)?,
            None => 0,
        };
        Ok(Instruction::new(self.class, self.ifun, self.ra, self.rb, valc))
    }
}

#[derive(Debug)]
pub struct SourceInfo {
    pub addr: Option<u64>,
    pub inst: Option<AsmInst>,
    pub label: Option<String>,
    pub src: String,
}

/// An assembled program.
#[derive(Debug, Default)]
pub struct Program {
    pub image: Vec<u8>,
    /// Address of `main`, or -1 when there is none.
    pub entry: i64,
    /// basically labels
    pub symbols: SymbolMap,
    /// annotate each line with its address
    pub source: Vec<SourceInfo>,
}

fn reg_of(pair: Pair<'_, Rule>) -> Result<u8> {
    use reg_code::*;
    Ok(match pair.as_str() {
        "%rax" => RAX,
        "%rcx" => RCX,
        "%rdx" => RDX,
        "%rbx" => RBX,
        "%rsp" => RSP,
        "%rbp" => RBP,
        "%rsi" => RSI,
        "%rdi" => RDI,
        "%r8" => R8,
        "%r9" => R9,
        "%r11" => R11,
        "%r12" => R12,
        "%r13" => R13,
        "%r14" => R14,
        "%r10" => bail!("%r10 cannot be encoded: its code marks \"no register\""),
        other => bail!("invalid register `{other}`"),
    })
}

fn num_of(pair: Pair<'_, Rule>) -> Result<i64> {
    let s = pair.as_str();
    parse_literal(s).with_context(|| format!("invalid number `{s}`"))
}

fn imm_of(pair: Pair<'_, Rule>) -> Result<Imm> {
    match pair.as_rule() {
        Rule::ident => Ok(Imm::Label(pair.as_str().to_string())),
        _ => {
            let num = pair.into_inner().next().context("missing number")?;
            Ok(Imm::Num(num_of(num)?))
        }
    }
}

/// `D(%reg)` as (displacement, base register).
fn addr_of(pair: Pair<'_, Rule>) -> Result<(i64, u8)> {
    let mut disp = 0;
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::num => disp = num_of(part)?,
            _ => return Ok((disp, reg_of(part)?)),
        }
    }
    bail!("memory operand without base register")
}

fn cond_of(suffix: &str) -> u8 {
    match suffix {
        "le" => cond_fn::LE,
        "l" => cond_fn::L,
        "e" => cond_fn::E,
        "ne" => cond_fn::NE,
        "ge" => cond_fn::GE,
        "g" => cond_fn::G,
        _ => cond_fn::YES,
    }
}

fn op_of(name: &str) -> u8 {
    match name {
        "subq" => op_code::SUB,
        "andq" => op_code::AND,
        "xorq" => op_code::XOR,
        _ => op_code::ADD,
    }
}

fn inst_of(pair: Pair<'_, Rule>) -> Result<AsmInst> {
    use reg_code::RNONE;
    let rule = pair.as_rule();
    let mut it = pair.into_inner();
    let mut next = || it.next().context("malformed statement");

    let head = next()?.as_str();
    Ok(match rule {
        Rule::i_single => {
            let class = match head {
                "halt" => OpClass::Halt,
                "nop" => OpClass::Nop,
                _ => OpClass::Ret,
            };
            AsmInst::new(class, 0, RNONE, RNONE, None)
        }
        Rule::i_opq => {
            let (ra, rb) = (reg_of(next()?)?, reg_of(next()?)?);
            AsmInst::new(OpClass::Opq, op_of(head), ra, rb, None)
        }
        Rule::i_cmov => {
            let ifun = head.strip_prefix("cmov").map_or(cond_fn::YES, cond_of);
            let (ra, rb) = (reg_of(next()?)?, reg_of(next()?)?);
            AsmInst::new(OpClass::Cmov, ifun, ra, rb, None)
        }
        Rule::i_irmovq => {
            let imm = imm_of(next()?)?;
            let rb = reg_of(next()?)?;
            AsmInst::new(OpClass::Irmovq, 0, RNONE, rb, Some(imm))
        }
        Rule::i_rmmovq => {
            let ra = reg_of(next()?)?;
            let (disp, rb) = addr_of(next()?)?;
            AsmInst::new(OpClass::Rmmovq, 0, ra, rb, Some(Imm::Num(disp)))
        }
        Rule::i_mrmovq => {
            let (disp, rb) = addr_of(next()?)?;
            let ra = reg_of(next()?)?;
            AsmInst::new(OpClass::Mrmovq, 0, ra, rb, Some(Imm::Num(disp)))
        }
        Rule::i_jx => {
            let ifun = head.strip_prefix('j').map_or(cond_fn::YES, cond_of);
            AsmInst::new(OpClass::Jxx, ifun, RNONE, RNONE, Some(imm_of(next()?)?))
        }
        Rule::i_call => AsmInst::new(OpClass::Call, 0, RNONE, RNONE, Some(imm_of(next()?)?)),
        Rule::i_pushq => AsmInst::new(OpClass::Pushq, 0, reg_of(next()?)?, RNONE, None),
        Rule::i_popq => AsmInst::new(OpClass::Popq, 0, reg_of(next()?)?, RNONE, None),
        other => bail!("unexpected statement {other:?}"),
    })
}

/// transform assembly code to a program image
pub fn assemble(src: &str, option: AssembleOption) -> Result<Program> {
    let lines = parse(src).context("fail to assemble source")?;
    let src_lines: Vec<&str> = src.lines().collect();
    let mut source = Vec::new();
    let mut symbols = SymbolMap::new();
    let mut cur_addr = 0u64;

    for line in lines.filter(|l| l.as_rule() == Rule::line) {
        let lineno = line.line_col().0;
        // the phantom empty line after a trailing newline
        let Some(text) = src_lines.get(lineno - 1) else {
            continue;
        };
        let mut info = SourceInfo {
            addr: None,
            inst: None,
            label: None,
            src: text.to_string(),
        };
        for pair in line.into_inner() {
            match pair.as_rule() {
                Rule::label_def => {
                    let name = pair
                        .into_inner()
                        .next()
                        .context("label without name")?
                        .as_str()
                        .to_string();
                    if symbols.insert(name.clone(), cur_addr).is_some() {
                        bail!("line {lineno}: duplicated label `{name}`");
                    }
                    info.addr = Some(cur_addr);
                    info.label = Some(name);
                }
                Rule::d_pos => {
                    let num = pair.into_inner().next().context("missing position")?;
                    let pos = num_of(num)?;
                    if !(0..=MAX_IMAGE as i64).contains(&pos) {
                        bail!("line {lineno}: position {pos} out of range");
                    }
                    cur_addr = pos as u64;
                    info.addr = Some(cur_addr)
                }
                _ => {
                    let inst = inst_of(pair).with_context(|| format!("line {lineno}"))?;
                    info.addr = Some(cur_addr);
                    cur_addr += inst.class.size() as u64;
                    if cur_addr > MAX_IMAGE {
                        bail!("line {lineno}: program exceeds {MAX_IMAGE} bytes");
                    }
                    info.inst = Some(inst);
                }
            }
        }
        if option.verbose {
            tracing::trace!("{:?}", info);
        }
        source.push(info);
    }
    if option.verbose {
        tracing::trace!("symbols: {:?}", symbols);
    }

    let mut image = Vec::new();
    for info in &source {
        if let (Some(addr), Some(inst)) = (info.addr, &info.inst) {
            let bytes = inst
                .resolve(&symbols)
                .with_context(|| format!("in `{}`", info.src.trim()))?
                .encode();
            let start = addr as usize;
            if image.len() < start + bytes.len() {
                image.resize(start + bytes.len(), 0);
            }
            image[start..start + bytes.len()].copy_from_slice(&bytes);
        }
    }

    let entry = symbols.get("main").map_or(-1, |&a| a as i64);
    Ok(Program {
        image,
        entry,
        symbols,
        source,
    })
}

impl Display for Program {
    /// display yo format
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for src in &self.source {
            if let Some(addr) = src.addr {
                let addr = addr as usize;
                write!(f, "{:#06x}: ", addr)?;
                if let Some(inst) = &src.inst {
                    let len = inst.class.size();
                    for byte in self.image.iter().skip(addr).take(len) {
                        write!(f, "{:02x}", byte)?;
                    }
                    write!(f, "{: <1$}", "", 21 - len * 2)?
                } else {
                    write!(f, "{: <21}", "")?
                }
            } else {
                write!(f, "{: <29}", "")?
            }
            writeln!(f, "| {}", src.src)?
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode;

    const RSUM_YS: &str = r#"
# sum 1..n recursively
main:
    irmovq $5, %rdi
    call rsum            # result in %rax
    halt

rsum:
    xorq %rax, %rax
    andq %rdi, %rdi
    je done
    pushq %rdi
    irmovq -1, %rcx
    addq %rcx, %rdi
    call rsum
    popq %rdi
    addq %rdi, %rax
done:
    ret
"#;

    #[test]
    fn assemble_labels_and_entry() -> Result<()> {
        let prog = assemble(RSUM_YS, AssembleOption::default())?;
        assert_eq!(prog.entry, 0);
        assert_eq!(prog.symbols["rsum"], 20);
        let done = prog.symbols["done"];

        let (call, _) = decode(&prog.image, 10)?;
        assert_eq!(call.class, OpClass::Call);
        assert_eq!(call.valc, 20);

        let (je, _) = decode(&prog.image, 24)?;
        assert_eq!((je.class, je.ifun, je.valc as u64), (OpClass::Jxx, cond_fn::E, done));

        let (irm, _) = decode(&prog.image, 35)?;
        assert_eq!(irm.valc, -1);
        assert_eq!(prog.image.len() as u64, done + 1);
        Ok(())
    }

    #[test]
    fn operand_forms() -> Result<()> {
        let prog = assemble(
            "main: mrmovq -8(%rbp), %r14\n rmmovq %rax (%rsp)\n cmovge %r8, %r9\n $end: .pos 0x40\n nop",
            AssembleOption::default(),
        )?;
        let (mr, p) = decode(&prog.image, 0)?;
        assert_eq!((mr.ra, mr.rb, mr.valc), (reg_code::R14, reg_code::RBP, -8));
        let (rm, p) = decode(&prog.image, p)?;
        assert_eq!((rm.ra, rm.rb, rm.valc), (reg_code::RAX, reg_code::RSP, 0));
        let (cm, _) = decode(&prog.image, p)?;
        assert_eq!((cm.class, cm.ifun), (OpClass::Cmov, cond_fn::GE));
        assert_eq!(prog.symbols["end"], 22);
        assert_eq!(prog.image.len(), 0x41);
        assert_eq!(prog.image[0x40], 0x10);
        Ok(())
    }

    #[test]
    fn missing_main_gives_negative_entry() -> Result<()> {
        let prog = assemble("halt\n", AssembleOption::default())?;
        assert_eq!(prog.entry, -1);
        assert_eq!(prog.image, vec![0x00]);
        Ok(())
    }

    #[test]
    fn rejects_bad_sources() {
        assert!(assemble("addq %r10, %rax", AssembleOption::default()).is_err());
        assert!(assemble("jmp nowhere", AssembleOption::default()).is_err());
        assert!(assemble("a:\na:", AssembleOption::default()).is_err());
        assert!(assemble("movq %rax, %rbx", AssembleOption::default()).is_err());
        assert!(assemble(".pos -8\nhalt", AssembleOption::default()).is_err());
        assert!(assemble(".pos 0x7fffffffffffffff\nhalt", AssembleOption::default()).is_err());
        assert!(assemble(".pos 0x100000\nhalt", AssembleOption::default()).is_err());
        assert!(assemble(".pos 0xfffff\nhalt", AssembleOption::default()).is_ok());
    }

    #[test]
    fn listing() -> Result<()> {
        let prog = assemble("main:\n    irmovq $7, %rax\n    halt", AssembleOption::default())?;
        let text = prog.to_string();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("0x0000:                      | main:"));
        assert_eq!(
            lines.next(),
            Some("0x0000: 30f0070000000000000000 |     irmovq $7, %rax")
        );
        assert_eq!(lines.next(), Some("0x000a: 00                   |     halt"));
        Ok(())
    }
}
