//! Native programs registered in every harness.

use {
    crate::invoke_context::InvokeContext,
    solana_instruction::error::InstructionError,
    solana_pubkey::Pubkey,
    solana_sdk_ids::system_program,
    solana_system_interface::{error::SystemError, instruction::SystemInstruction},
};

/// Compute units charged by each builtin instruction.
pub const DEFAULT_COMPUTE_UNITS: u64 = 150;

fn system_error(err: SystemError) -> InstructionError {
    InstructionError::Custom(err as u32)
}

fn require_signer(ctx: &InvokeContext, index: usize) -> Result<(), InstructionError> {
    if !ctx.is_signer(index)? {
        log::debug!("{} must sign", ctx.account_key(index)?);
        return Err(InstructionError::MissingRequiredSignature);
    }
    Ok(())
}

fn transfer(
    ctx: &mut InvokeContext,
    from: usize,
    to: usize,
    lamports: u64,
) -> Result<(), InstructionError> {
    require_signer(ctx, from)?;
    let from_account = ctx.account(from)?;
    if !from_account.data.is_empty() {
        ctx.log("Transfer: `from` must not carry data");
        return Err(InstructionError::InvalidArgument);
    }
    if from_account.lamports < lamports {
        ctx.log(&format!(
            "Transfer: insufficient lamports {}, need {lamports}",
            from_account.lamports
        ));
        return Err(system_error(SystemError::ResultWithNegativeLamports));
    }
    ctx.account_mut(from)?.lamports -= lamports;
    let to_account = ctx.account_mut(to)?;
    to_account.lamports = to_account
        .lamports
        .checked_add(lamports)
        .ok_or(InstructionError::ArithmeticOverflow)?;
    Ok(())
}

fn allocate(ctx: &mut InvokeContext, index: usize, space: u64) -> Result<(), InstructionError> {
    require_signer(ctx, index)?;
    let account = ctx.account(index)?;
    if !account.data.is_empty() || account.owner != system_program::id() {
        ctx.log(&format!(
            "Allocate: account {} already in use",
            ctx.account_key(index)?
        ));
        return Err(system_error(SystemError::AccountAlreadyInUse));
    }
    let max = ctx.max_account_data_size();
    let space = usize::try_from(space).unwrap_or(usize::MAX);
    if space > max {
        ctx.log(&format!("Allocate: requested {space}, max allowed {max}"));
        return Err(system_error(SystemError::InvalidAccountDataLength));
    }
    ctx.account_mut(index)?.data = vec![0; space];
    Ok(())
}

fn assign(ctx: &mut InvokeContext, index: usize, owner: &Pubkey) -> Result<(), InstructionError> {
    if ctx.account(index)?.owner == *owner {
        return Ok(());
    }
    require_signer(ctx, index)?;
    ctx.account_mut(index)?.owner = *owner;
    Ok(())
}

fn create_account(
    ctx: &mut InvokeContext,
    lamports: u64,
    space: u64,
    owner: &Pubkey,
) -> Result<(), InstructionError> {
    let to = ctx.account(1)?;
    if to.lamports > 0 {
        ctx.log(&format!(
            "Create Account: account {} already in use",
            ctx.account_key(1)?
        ));
        return Err(system_error(SystemError::AccountAlreadyInUse));
    }
    allocate(ctx, 1, space)?;
    assign(ctx, 1, owner)?;
    transfer(ctx, 0, 1, lamports)
}

/// The system program: account creation, assignment and lamport transfers.
pub fn process_system_instruction(ctx: &mut InvokeContext) -> Result<(), InstructionError> {
    ctx.consume(DEFAULT_COMPUTE_UNITS)?;
    let instruction: SystemInstruction = bincode::deserialize(ctx.instruction_data()?)
        .map_err(|_| InstructionError::InvalidInstructionData)?;
    log::trace!("system instruction: {instruction:?}");

    match instruction {
        SystemInstruction::CreateAccount {
            lamports,
            space,
            owner,
        } => create_account(ctx, lamports, space, &owner),
        SystemInstruction::Assign { owner } => assign(ctx, 0, &owner),
        SystemInstruction::Transfer { lamports } => transfer(ctx, 0, 1, lamports),
        SystemInstruction::Allocate { space } => allocate(ctx, 0, space),
        _ => Err(InstructionError::InvalidInstructionData),
    }
}

/// The compute budget program. Its instructions are read before execution,
/// so executing one only costs compute.
pub fn process_compute_budget_instruction(ctx: &mut InvokeContext) -> Result<(), InstructionError> {
    ctx.consume(DEFAULT_COMPUTE_UNITS)
}
