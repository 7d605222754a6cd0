use {
    cuttle_svm::{
        program::{from_fn, loader_keys},
        result::{Check, TransactionResultExt},
        ComputeBudget, Cuttle, CuttleConfig, InvokeContext, ProgramExecutor, ProgramLoader,
    },
    cuttle_svm_error::error::{CuttleError, DeployError, TransactionError},
    solana_account::Account,
    solana_clock::Clock,
    solana_compute_budget_interface::ComputeBudgetInstruction,
    solana_instruction::{error::InstructionError, AccountMeta, Instruction},
    solana_keypair::Keypair,
    solana_pubkey::Pubkey,
    solana_sdk_ids::system_program,
    solana_signer::Signer,
    solana_system_interface::instruction as system_instruction,
    solana_transaction::Transaction,
    std::sync::Arc,
};

fn minimal_elf() -> Vec<u8> {
    let mut elf = vec![0; 64];
    elf[..4].copy_from_slice(b"\x7fELF");
    elf[4] = 2; // 64-bit
    elf[5] = 1; // little endian
    elf[16..18].copy_from_slice(&3u16.to_le_bytes()); // shared object
    elf[18..20].copy_from_slice(&263u16.to_le_bytes()); // SBF
    elf
}

fn send(cuttle: &mut Cuttle, instructions: &[Instruction], checks: &[Check]) {
    let transaction = Transaction::new_signed_with_payer(
        instructions,
        Some(&cuttle.payer().pubkey()),
        &[cuttle.payer()],
        cuttle.latest_blockhash(),
    );
    cuttle.send_and_validate_transaction(transaction, checks);
}

/// Stands in for an interpreter by running the same native executor for
/// every deployed image.
struct NativeStandIn {
    executor: Arc<dyn ProgramExecutor>,
}

impl ProgramLoader for NativeStandIn {
    fn load(
        &self,
        _program_id: &Pubkey,
        _elf: &[u8],
    ) -> Result<Arc<dyn ProgramExecutor>, DeployError> {
        Ok(Arc::clone(&self.executor))
    }
}

/// Increments a little-endian counter in its first account. A first data
/// byte of 1 makes it spin until it runs out of compute afterwards.
fn counter(ctx: &mut InvokeContext) -> Result<(), InstructionError> {
    ctx.consume(100)?;
    let spin = ctx.instruction_data()?.first() == Some(&1);

    let account = ctx.account_mut(0)?;
    let bytes: [u8; 8] = account.data[..8]
        .try_into()
        .map_err(|_| InstructionError::InvalidAccountData)?;
    let value = u64::from_le_bytes(bytes) + 1;
    account.data[..8].copy_from_slice(&value.to_le_bytes());

    if spin {
        loop {
            ctx.consume(10_000)?;
        }
    }
    Ok(())
}

fn counter_setup(cuttle: &mut Cuttle) -> (Pubkey, Pubkey) {
    cuttle.set_program_loader(NativeStandIn {
        executor: from_fn(counter),
    });
    let program_id = Pubkey::new_unique();
    cuttle.deploy_program(program_id, &minimal_elf()).unwrap();

    let counter_key = Pubkey::new_unique();
    let lamports = cuttle.minimum_balance_for_rent_exemption(8);
    cuttle
        .set_account(counter_key, Account::new(lamports, 8, &program_id))
        .unwrap();
    (program_id, counter_key)
}

#[test]
fn test_deployed_program() {
    let mut cuttle = Cuttle::default();
    let (program_id, counter_key) = counter_setup(&mut cuttle);

    let program_account = cuttle.get_account(&program_id).unwrap();
    assert!(program_account.executable);
    assert_eq!(program_account.owner, loader_keys::BPF_LOADER);
    assert_eq!(program_account.data, minimal_elf());

    let increment = |nonce: u8| {
        Instruction::new_with_bytes(program_id, &[0, nonce], vec![AccountMeta::new(counter_key, false)])
    };
    send(
        &mut cuttle,
        &[increment(0)],
        &[
            Check::success(),
            Check::compute_units(100),
            Check::account(&counter_key).data(&1u64.to_le_bytes()).build(),
        ],
    );
    send(
        &mut cuttle,
        &[increment(1), increment(2)],
        &[
            Check::success(),
            Check::compute_units(200),
            Check::account(&counter_key).data(&3u64.to_le_bytes()).build(),
        ],
    );
}

#[test]
fn test_compute_budget_exceeded_rolls_back() {
    let mut cuttle = Cuttle::default();
    let (program_id, counter_key) = counter_setup(&mut cuttle);
    let payer_balance = cuttle.get_balance(&cuttle.payer().pubkey());

    send(
        &mut cuttle,
        &[Instruction::new_with_bytes(
            program_id,
            &[1],
            vec![AccountMeta::new(counter_key, false)],
        )],
        &[
            Check::err(TransactionError::ComputeBudgetExceeded { index: 0 }),
            Check::compute_units(1_400_000),
            Check::fee(0),
        ],
    );

    assert_eq!(cuttle.get_account(&counter_key).unwrap().data, vec![0; 8]);
    assert_eq!(cuttle.get_balance(&cuttle.payer().pubkey()), payer_balance);
}

#[test]
fn test_deployed_program_without_loader() {
    let mut cuttle = Cuttle::default();
    let program_id = Pubkey::new_unique();
    cuttle.deploy_program(program_id, &minimal_elf()).unwrap();

    send(
        &mut cuttle,
        &[Instruction::new_with_bytes(program_id, &[], vec![])],
        &[Check::instruction_err(0, InstructionError::UnsupportedProgramId)],
    );
}

#[test]
fn test_deploy_errors() {
    let mut cuttle = Cuttle::new(CuttleConfig::default().with_max_program_size(63));
    let program_id = Pubkey::new_unique();

    assert_eq!(
        cuttle.deploy_program(program_id, &minimal_elf()),
        Err(DeployError::ProgramTooLarge { size: 64, max: 63 }),
    );
    assert_eq!(
        cuttle.deploy_program(program_id, &[0; 32]),
        Err(DeployError::InvalidElf("file is shorter than an ELF header")),
    );

    let mut cuttle = Cuttle::default();
    assert_eq!(
        cuttle.deploy_program(program_id, &[0; 64]),
        Err(DeployError::InvalidElf("bad magic number")),
    );
    let mut x86 = minimal_elf();
    x86[18..20].copy_from_slice(&62u16.to_le_bytes());
    assert_eq!(
        cuttle.deploy_program(program_id, &x86),
        Err(DeployError::InvalidElf("machine is not BPF or SBF")),
    );
    assert!(cuttle.get_account(&program_id).is_none());
}

#[test]
fn test_reserved_program_addresses() {
    let mut cuttle = Cuttle::default();
    let clock_id = solana_sdk_ids::sysvar::clock::id();
    let clock: Clock = cuttle.get_sysvar();

    assert_eq!(
        cuttle.deploy_program(clock_id, &minimal_elf()),
        Err(DeployError::ReservedAddress(clock_id)),
    );
    assert_eq!(
        cuttle.deploy_program(system_program::id(), &minimal_elf()),
        Err(DeployError::ReservedAddress(system_program::id())),
    );
    assert_eq!(
        cuttle.add_builtin(clock_id, "clock", from_fn(|_| Ok(()))),
        Err(CuttleError::ReservedAccount(clock_id)),
    );

    assert_eq!(cuttle.get_sysvar::<Clock>(), clock);
    let account = cuttle.get_account(&clock_id).unwrap();
    assert!(!account.executable);
    assert_eq!(account.owner, solana_sdk_ids::sysvar::id());

    // The system program still runs.
    let recipient = Pubkey::new_unique();
    let payer = cuttle.payer().pubkey();
    send(
        &mut cuttle,
        &[system_instruction::transfer(&payer, &recipient, 1_000_000_000)],
        &[Check::success(), Check::compute_units(150)],
    );
}

#[test]
fn test_requested_compute_limit_is_capped() {
    let mut cuttle = Cuttle::new(CuttleConfig::default().with_compute_budget(ComputeBudget {
        compute_unit_limit: 1_000,
        ..ComputeBudget::default()
    }));
    let program_id = Pubkey::new_unique();
    cuttle
        .add_builtin(program_id, "burner", from_fn(|ctx| ctx.consume(5_000)))
        .unwrap();

    send(
        &mut cuttle,
        &[
            ComputeBudgetInstruction::set_compute_unit_limit(100_000),
            Instruction::new_with_bytes(program_id, &[], vec![]),
        ],
        &[Check::err(TransactionError::ComputeBudgetExceeded { index: 1 })],
    );

    // A lower request still applies.
    send(
        &mut cuttle,
        &[ComputeBudgetInstruction::set_compute_unit_limit(400)],
        &[
            Check::success(),
            Check::log("consumed 150 of 400 compute units"),
        ],
    );
}

#[test]
fn test_logs_truncated_past_limit() {
    let mut cuttle = Cuttle::new(CuttleConfig::default().with_compute_budget(ComputeBudget {
        log_bytes_limit: 200,
        ..ComputeBudget::default()
    }));
    let program_id = Pubkey::new_unique();
    cuttle
        .add_builtin(
            program_id,
            "chatty",
            from_fn(|ctx| {
                for _ in 0..10 {
                    ctx.log(&"x".repeat(40));
                }
                Ok(())
            }),
        )
        .unwrap();

    let transaction = Transaction::new_signed_with_payer(
        &[Instruction::new_with_bytes(program_id, &[], vec![])],
        Some(&cuttle.payer().pubkey()),
        &[cuttle.payer()],
        cuttle.latest_blockhash(),
    );
    let result = cuttle.send_transaction(transaction);

    // Running out of log space does not fail the transaction.
    assert!(result.is_ok());
    let logs = &result.meta().logs;
    assert_eq!(logs.first(), Some(&format!("Program {program_id} invoke [1]")));
    assert_eq!(logs.last().map(String::as_str), Some("Log truncated"));
    assert_eq!(logs.iter().filter(|line| *line == "Log truncated").count(), 1);
    assert!(logs[..logs.len() - 1].iter().map(String::len).sum::<usize>() < 200);
}

#[test]
fn test_builtin_reads_sysvars_and_returns_data() {
    let mut cuttle = Cuttle::default();
    let program_id = Pubkey::new_unique();
    cuttle.add_builtin(
        program_id,
        "slot_reporter",
        from_fn(|ctx| {
            let clock: Clock = ctx.get_sysvar();
            ctx.log(&format!("slot {}", clock.slot));
            ctx.set_return_data(&clock.slot.to_le_bytes())
        }),
    ).unwrap();
    cuttle.warp_to_slot(10);

    let instruction = Instruction::new_with_bytes(program_id, &[], vec![]);
    let transaction = Transaction::new_signed_with_payer(
        &[instruction],
        Some(&cuttle.payer().pubkey()),
        &[cuttle.payer()],
        cuttle.latest_blockhash(),
    );
    let result = cuttle.simulate_and_validate_transaction(
        &transaction,
        &[
            Check::success(),
            Check::log("Program log: slot 10"),
            Check::return_data(&10u64.to_le_bytes()),
        ],
    );
    assert_eq!(result.meta().return_data.program_id, program_id);
}

#[test]
fn test_heap_frame_request() {
    let mut cuttle = Cuttle::default();
    let program_id = Pubkey::new_unique();
    cuttle.add_builtin(
        program_id,
        "allocator",
        from_fn(|ctx| ctx.allocate_heap(64 * 1024)),
    ).unwrap();
    let allocate = Instruction::new_with_bytes(program_id, &[], vec![]);

    send(
        &mut cuttle,
        &[allocate.clone()],
        &[Check::err(TransactionError::ComputeBudgetExceeded { index: 0 })],
    );
    send(
        &mut cuttle,
        &[ComputeBudgetInstruction::request_heap_frame(128 * 1024), allocate],
        &[Check::success()],
    );
}

#[test]
fn test_stack_frames() {
    let mut cuttle = Cuttle::default();
    let program_id = Pubkey::new_unique();
    cuttle.add_builtin(
        program_id,
        "recursive_descent",
        from_fn(|ctx| {
            let depth = usize::from(ctx.instruction_data()?[0]);
            for _ in 0..depth {
                ctx.push_stack_frame(1_024)?;
            }
            for _ in 0..depth {
                ctx.pop_stack_frame()?;
            }
            Ok(())
        }),
    ).unwrap();

    send(
        &mut cuttle,
        &[Instruction::new_with_bytes(program_id, &[64], vec![])],
        &[Check::success()],
    );
    send(
        &mut cuttle,
        &[Instruction::new_with_bytes(program_id, &[65], vec![])],
        &[Check::err(TransactionError::CallDepthExceeded { index: 0 })],
    );
}

/// Moves lamports out of the program's vault PDA through the system program.
fn vault_transfer(ctx: &mut InvokeContext) -> Result<(), InstructionError> {
    let amount: [u8; 8] = ctx
        .instruction_data()?
        .try_into()
        .map_err(|_| InstructionError::InvalidInstructionData)?;
    let program_id = ctx.program_id()?;
    let vault = *ctx.account_key(0)?;
    let recipient = *ctx.account_key(1)?;

    let (expected, bump) = Pubkey::find_program_address(&[b"vault"], &program_id);
    if vault != expected {
        return Err(InstructionError::InvalidSeeds);
    }
    ctx.invoke_signed(
        &system_instruction::transfer(&vault, &recipient, u64::from_le_bytes(amount)),
        &[&[b"vault", &[bump]]],
    )
}

#[test]
fn test_cpi_with_program_signer() {
    let mut cuttle = Cuttle::default();
    let program_id = Pubkey::new_unique();
    cuttle.add_builtin(program_id, "vault", from_fn(vault_transfer)).unwrap();

    let (vault, _) = Pubkey::find_program_address(&[b"vault"], &program_id);
    let recipient = Pubkey::new_unique();
    cuttle.airdrop(&vault, 1_000_000_000).unwrap();

    let instruction = Instruction::new_with_bytes(
        program_id,
        &100_000_000u64.to_le_bytes(),
        vec![
            AccountMeta::new(vault, false),
            AccountMeta::new(recipient, false),
            AccountMeta::new_readonly(system_program::id(), false),
        ],
    );
    let transaction = Transaction::new_signed_with_payer(
        &[instruction],
        Some(&cuttle.payer().pubkey()),
        &[cuttle.payer()],
        cuttle.latest_blockhash(),
    );
    let result = cuttle.send_and_validate_transaction(
        transaction,
        &[
            Check::success(),
            Check::compute_units(1_150),
            Check::account(&vault).lamports(900_000_000).build(),
            Check::account(&recipient).lamports(100_000_000).build(),
        ],
    );

    let system = system_program::id();
    assert_eq!(
        result.meta().logs,
        vec![
            format!("Program {program_id} invoke [1]"),
            format!("Program {system} invoke [2]"),
            format!("Program {system} consumed 150 of 1399000 compute units"),
            format!("Program {system} success"),
            format!("Program {program_id} consumed 1150 of 1400000 compute units"),
            format!("Program {program_id} success"),
        ],
    );
}

#[test]
fn test_cpi_privilege_escalation() {
    let mut cuttle = Cuttle::default();
    let program_id = Pubkey::new_unique();
    // Tries to move lamports out of an account it was not given a signature
    // for, and ignores the failure.
    cuttle.add_builtin(
        program_id,
        "thief",
        from_fn(|ctx| {
            let victim = *ctx.account_key(0)?;
            let recipient = *ctx.account_key(1)?;
            let _ = ctx.invoke(&system_instruction::transfer(&victim, &recipient, 1));
            Ok(())
        }),
    ).unwrap();

    let victim = Keypair::new();
    let recipient = Pubkey::new_unique();
    cuttle.airdrop(&victim.pubkey(), 1_000_000_000).unwrap();

    send(
        &mut cuttle,
        &[Instruction::new_with_bytes(
            program_id,
            &[],
            vec![
                AccountMeta::new(victim.pubkey(), false),
                AccountMeta::new(recipient, false),
                AccountMeta::new_readonly(system_program::id(), false),
            ],
        )],
        &[Check::instruction_err(0, InstructionError::PrivilegeEscalation)],
    );
    assert_eq!(cuttle.get_balance(&victim.pubkey()), Some(1_000_000_000));
}

#[test]
fn test_cpi_depth() {
    let mut cuttle = Cuttle::default();
    let recurse_to = |target: usize| {
        from_fn(move |ctx| {
            if ctx.invoke_depth() >= target {
                return Ok(());
            }
            let program_id = ctx.program_id()?;
            ctx.invoke(&Instruction::new_with_bytes(program_id, &[], vec![]))
        })
    };
    let bounded = Pubkey::new_unique();
    let unbounded = Pubkey::new_unique();
    cuttle.add_builtin(bounded, "bounded", recurse_to(5)).unwrap();
    cuttle.add_builtin(unbounded, "unbounded", recurse_to(usize::MAX)).unwrap();

    send(
        &mut cuttle,
        &[Instruction::new_with_bytes(bounded, &[], vec![])],
        &[
            Check::success(),
            Check::compute_units(4_000),
            Check::log(&format!("Program {bounded} invoke [5]")),
        ],
    );
    send(
        &mut cuttle,
        &[Instruction::new_with_bytes(unbounded, &[], vec![])],
        &[Check::err(TransactionError::CallDepthExceeded { index: 0 })],
    );
}

#[test]
fn test_cpi_reentrancy() {
    let mut cuttle = Cuttle::default();
    let first = Pubkey::new_unique();
    let second = Pubkey::new_unique();
    let call = |callee: Pubkey| {
        from_fn(move |ctx| ctx.invoke(&Instruction::new_with_bytes(callee, &[], vec![])))
    };
    cuttle.add_builtin(first, "first", call(second)).unwrap();
    cuttle.add_builtin(second, "second", call(first)).unwrap();

    send(
        &mut cuttle,
        &[Instruction::new_with_bytes(
            first,
            &[],
            vec![AccountMeta::new_readonly(second, false)],
        )],
        &[Check::instruction_err(0, InstructionError::ReentrancyNotAllowed)],
    );
}

#[test]
fn test_unbalanced_instruction() {
    let mut cuttle = Cuttle::default();
    let program_id = Pubkey::new_unique();
    cuttle.add_builtin(
        program_id,
        "minter",
        from_fn(|ctx| {
            ctx.account_mut(0)?.lamports += 1;
            Ok(())
        }),
    ).unwrap();
    let pocket = Pubkey::new_unique();
    cuttle
        .set_account(pocket, Account::new(1_000_000_000, 0, &program_id))
        .unwrap();

    send(
        &mut cuttle,
        &[Instruction::new_with_bytes(
            program_id,
            &[],
            vec![AccountMeta::new(pocket, false)],
        )],
        &[Check::instruction_err(0, InstructionError::UnbalancedInstruction)],
    );
    assert_eq!(cuttle.get_balance(&pocket), Some(1_000_000_000));
}
