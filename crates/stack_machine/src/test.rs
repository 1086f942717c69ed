use super::*;
use crate::assembler::assemble;
use crate::console::StreamConsole;
use crate::memory::MemoryConfig;
use crate::registers::Register;

use std::vec::Vec as StdVec;

type TestConsole = StreamConsole<&'static [u8], StdVec<u8>>;

fn machine_with(source: &str, input: &'static str, config: MemoryConfig) -> Processor<TestConsole> {
    let code = assemble(source).unwrap();
    let memory = Memory::new(config).unwrap();
    Processor::new(code, memory, StreamConsole::new(input.as_bytes(), StdVec::new()))
}

fn machine(source: &str, input: &'static str) -> Processor<TestConsole> {
    machine_with(source, input, MemoryConfig::default())
}

fn output(processor: Processor<TestConsole>) -> String {
    String::from_utf8(processor.into_console().into_output()).unwrap()
}

fn run_output(source: &str) -> String {
    let mut processor = machine(source, "");
    processor.run().unwrap();
    output(processor)
}

#[test]
fn test_add_and_out() -> Result<(), MachineError> {
    let mut processor = machine("PUSH 3\nPUSH 4\nADD\nOUT\n", "");
    processor.run()?;
    assert!(processor.stack().is_empty());
    assert_eq!(output(processor), "7\n");
    Ok(())
}

#[test]
fn test_first_popped_is_left_operand() {
    let source = "
        PUSH 2
        PUSH 10
        SUB
        OUT
        PUSH 2
        PUSH 10
        DIV
        OUT
        PUSH 3
        PUSH -4
        MUL
        OUT
    ";
    assert_eq!(run_output(source), "8\n5\n-12\n");
}

#[test]
fn test_arithmetic_wraps() {
    let source = format!("PUSH 1\nPUSH {}\nADD\nOUT\n", Word::MAX);
    assert_eq!(run_output(&source), format!("{}\n", Word::MIN));
}

#[test]
fn test_addressing_modes() -> Result<(), MachineError> {
    let source = "
        PUSH 300
        POP RAX
        PUSH 42
        POP [RAX + 5]
        PUSH [305]
        OUT
        PUSH RAX + 1
        OUT
        PUSH 7
        POP [400]
        PUSH [RAX+100]
        OUT
    ";
    let mut processor = machine(source, "");
    processor.run()?;
    assert_eq!(processor.registers().get(Register::Rax), 300);
    assert_eq!(processor.memory().read(305)?, 42);
    assert_eq!(output(processor), "42\n301\n7\n");
    Ok(())
}

#[test]
fn test_character_literals() {
    assert_eq!(run_output("PUSH 'A'\nOUT\nPUSH 'a' + RBX\nOUT"), "65\n97\n");
}

#[test]
fn test_conditional_jumps() {
    // (top, second, mnemonic, taken) with `top` pushed last.
    let cases = [
        (2, 1, "JA", true),
        (1, 2, "JA", false),
        (5, 5, "JA", false),
        (5, 5, "JAE", true),
        (4, 5, "JAE", false),
        (1, 2, "JB", true),
        (5, 5, "JB", false),
        (5, 5, "JBE", true),
        (6, 5, "JBE", false),
        (5, 5, "JE", true),
        (5, 6, "JE", false),
        (5, 6, "JNE", true),
        (5, 5, "JNE", false),
        (-1, 0, "JB", true),
    ];
    for (top, second, mnemonic, taken) in cases {
        let source = format!(
            "PUSH {second}\nPUSH {top}\n{mnemonic} yes\n\
             PUSH 0\nOUT\nJMP end\nyes:\nPUSH 1\nOUT\nend:\n"
        );
        let mut processor = machine(&source, "");
        processor.run().unwrap();
        // Both compared values are still there.
        assert_eq!(processor.stack(), &[second, top]);
        let expected = if taken { "1\n" } else { "0\n" };
        assert_eq!(
            output(processor),
            expected,
            "{mnemonic} with top {top} and second {second}"
        );
    }
}

#[test]
fn test_call_and_ret() -> Result<(), MachineError> {
    let source = "
        CALL double
        OUT
        JMP end
    double:
        PUSH 21
        PUSH 2
        MUL
        RET
    end:
    ";
    let mut processor = machine(source, "");
    processor.run()?;
    assert!(processor.call_stack().is_empty());
    assert_eq!(output(processor), "42\n");
    Ok(())
}

#[test]
fn test_nested_calls() {
    let source = "
        CALL outer
        PUSH 3
        OUT
        JMP end
    outer:
        CALL inner
        PUSH 2
        OUT
        RET
    inner:
        PUSH 1
        OUT
        RET
    end:
    ";
    assert_eq!(run_output(source), "1\n2\n3\n");
}

#[test]
fn test_ret_with_empty_call_stack() {
    let mut processor = machine("PUSH 1\nRET\nOUT", "");
    assert!(matches!(processor.run(), Err(MachineError::EmptyCallStack)));
}

#[test]
fn test_divide_by_zero_is_fatal() {
    let mut processor = machine("PUSH 0\nPUSH 5\nDIV\nPUSH 1\nOUT", "");
    assert!(matches!(processor.run(), Err(MachineError::DivideByZero)));
    assert_eq!(output(processor), "");
}

#[test]
fn test_underflow_continues() -> Result<(), MachineError> {
    let source = "
        ADD
        OUT
        POP RAX
        PUSH 9
        OUT
    ";
    let mut processor = machine(source, "");
    processor.run()?;
    assert_eq!(processor.registers().get(Register::Rax), 0);
    assert_eq!(output(processor), "9\n");
    Ok(())
}

#[test]
fn test_underflow_on_second_operand_consumes_first() -> Result<(), MachineError> {
    let mut processor = machine("PUSH 4\nSUB\nPUSH 1\nOUT", "");
    processor.run()?;
    assert!(processor.stack().is_empty());
    assert_eq!(output(processor), "1\n");
    Ok(())
}

#[test]
fn test_conditional_jump_underflow_skips_target() -> Result<(), MachineError> {
    let source = "
        PUSH 1
        JE skip
        OUT
        JNE skip
        PUSH 2
        OUT
    skip:
    ";
    let mut processor = machine(source, "");
    processor.run()?;
    assert_eq!(output(processor), "1\n2\n");
    Ok(())
}

#[test]
fn test_in_reads_console() -> Result<(), MachineError> {
    let mut processor = machine("IN\nIN\nADD\nOUT", "5\n6\n");
    processor.run()?;
    assert_eq!(output(processor), "11\n");
    Ok(())
}

#[test]
fn test_in_exhausted_is_fatal() {
    let mut processor = machine("IN\nIN", "5");
    assert!(matches!(
        processor.run(),
        Err(MachineError::Console(ConsoleError::InputExhausted))
    ));
    assert_eq!(processor.stack(), &[5]);
}

#[test]
fn test_in_malformed_is_fatal() {
    let mut processor = machine("IN", "-5");
    assert!(matches!(
        processor.run(),
        Err(MachineError::Console(ConsoleError::MalformedInput(_)))
    ));
}

#[test]
fn test_draw_framebuffer() -> Result<(), MachineError> {
    let config = MemoryConfig {
        capacity: 64,
        rows: 1,
        columns: 3,
    };
    let source = "
        PUSH 'H'
        POP [0]
        PUSH 'i'
        POP [2]
        DRAW
    ";
    let mut processor = machine_with(source, "", config);
    processor.run()?;
    assert_eq!(output(processor), "Hi \n");
    Ok(())
}

#[test]
fn test_memory_out_of_range() {
    let mut processor = machine("PUSH [5000]", "");
    assert!(matches!(
        processor.run(),
        Err(MachineError::Memory(MemoryError::OutOfRange(5000)))
    ));

    let mut processor = machine("PUSH 1\nPOP [RAX + -1]", "");
    assert!(matches!(
        processor.run(),
        Err(MachineError::Memory(MemoryError::OutOfRange(-1)))
    ));
}

#[test]
fn test_stack_overflow() {
    let mut processor = machine("top:\nPUSH 1\nJMP top", "");
    assert!(matches!(processor.run(), Err(MachineError::StackOverflow)));
    assert_eq!(processor.stack().len(), STACK_CAPACITY);
}

#[test]
fn test_call_stack_overflow() {
    let mut processor = machine("top:\nCALL top", "");
    assert!(matches!(processor.run(), Err(MachineError::CallStackOverflow)));
    assert_eq!(processor.call_stack().len(), CALL_STACK_CAPACITY);
}

#[test]
fn test_raw_bytecode_errors() {
    let run = |words: &[Word]| {
        let code = Bytecode::from_words(words).unwrap();
        let memory = Memory::new(MemoryConfig::default()).unwrap();
        Processor::new(code, memory, StreamConsole::new(&b""[..], StdVec::new())).run()
    };
    assert!(matches!(run(&[99]), Err(MachineError::UnknownOpcode(99))));
    assert!(matches!(run(&[2, 0b001, 5]), Err(MachineError::InvalidPopTarget)));
    assert!(matches!(run(&[1, 0b010, 9]), Err(MachineError::InvalidRegister(9))));
    assert!(matches!(run(&[1, 0b100, 9]), Err(MachineError::InvalidMode(4))));
    assert!(matches!(
        run(&[11, 3]),
        Err(MachineError::Bytecode(BytecodeError::Overflow))
    ));
    assert!(matches!(
        run(&[11, -1]),
        Err(MachineError::Bytecode(BytecodeError::Underflow))
    ));
    assert!(matches!(
        run(&[1]),
        Err(MachineError::Bytecode(BytecodeError::EndOfProgram))
    ));
}

#[test]
fn test_jump_to_end_halts() -> Result<(), MachineError> {
    let code = Bytecode::from_words(&[11, 2])?;
    let memory = Memory::new(MemoryConfig::default())?;
    let mut processor = Processor::new(code, memory, StreamConsole::new(&b""[..], StdVec::new()));
    assert_eq!(processor.step()?, Status::Running);
    assert_eq!(processor.position(), 2);
    assert_eq!(processor.step()?, Status::Halted);
    Ok(())
}

#[test]
fn test_empty_program_halts() -> Result<(), MachineError> {
    let mut processor = machine("; nothing here\n", "");
    assert_eq!(processor.step()?, Status::Halted);
    processor.run()?;
    assert_eq!(output(processor), "");
    Ok(())
}
