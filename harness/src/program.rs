//! Program registry: native builtins, deployed programs, and the executor
//! seam they are run through.

use {
    crate::invoke_context::InvokeContext,
    cuttle_svm_error::error::DeployError,
    solana_account::Account,
    solana_instruction::error::InstructionError,
    solana_pubkey::Pubkey,
    solana_rent::Rent,
    std::{collections::HashMap, fmt, sync::Arc},
};

pub mod loader_keys {
    pub use solana_sdk_ids::{bpf_loader::ID as BPF_LOADER, native_loader::ID as NATIVE_LOADER};
}

/// Executes a single instruction of a program.
pub trait ProgramExecutor: Send + Sync {
    fn execute(&self, invoke_context: &mut InvokeContext) -> Result<(), InstructionError>;
}

impl<F> ProgramExecutor for F
where
    F: Fn(&mut InvokeContext) -> Result<(), InstructionError> + Send + Sync,
{
    fn execute(&self, invoke_context: &mut InvokeContext) -> Result<(), InstructionError> {
        self(invoke_context)
    }
}

/// Wrap a closure as a shareable executor.
pub fn from_fn<F>(f: F) -> Arc<dyn ProgramExecutor>
where
    F: Fn(&mut InvokeContext) -> Result<(), InstructionError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Turns a deployed program image into something executable.
///
/// The harness does not interpret bytecode itself. A loader bridges deployed
/// bytes to an interpreter, or to a native stand-in for the program.
pub trait ProgramLoader: Send + Sync {
    fn load(
        &self,
        program_id: &Pubkey,
        elf: &[u8],
    ) -> Result<Arc<dyn ProgramExecutor>, DeployError>;
}

impl<F> ProgramLoader for F
where
    F: Fn(&Pubkey, &[u8]) -> Result<Arc<dyn ProgramExecutor>, DeployError> + Send + Sync,
{
    fn load(
        &self,
        program_id: &Pubkey,
        elf: &[u8],
    ) -> Result<Arc<dyn ProgramExecutor>, DeployError> {
        self(program_id, elf)
    }
}

const ELF_MAGIC: &[u8; 4] = b"\x7fELF";
const ELF_HEADER_LEN: usize = 64;
const ELFCLASS64: u8 = 2;
const ELFDATA2LSB: u8 = 1;
const ET_DYN: u16 = 3;
const EM_BPF: u16 = 247;
const EM_SBPF: u16 = 263;

/// Check that `elf` looks like an SBF shared object.
///
/// Only the identification header is inspected; sections and relocations
/// are the loader's concern.
pub fn validate_elf(elf: &[u8]) -> Result<(), DeployError> {
    if elf.len() < ELF_HEADER_LEN {
        return Err(DeployError::InvalidElf("file is shorter than an ELF header"));
    }
    if &elf[..4] != ELF_MAGIC {
        return Err(DeployError::InvalidElf("bad magic number"));
    }
    if elf[4] != ELFCLASS64 {
        return Err(DeployError::InvalidElf("not a 64-bit image"));
    }
    if elf[5] != ELFDATA2LSB {
        return Err(DeployError::InvalidElf("not little endian"));
    }
    if u16::from_le_bytes([elf[16], elf[17]]) != ET_DYN {
        return Err(DeployError::InvalidElf("not a shared object"));
    }
    let machine = u16::from_le_bytes([elf[18], elf[19]]);
    if machine != EM_BPF && machine != EM_SBPF {
        return Err(DeployError::InvalidElf("machine is not BPF or SBF"));
    }
    Ok(())
}

/// Create the executable account a program lives at.
pub fn create_program_account(loader_key: &Pubkey, data: Vec<u8>, rent: &Rent) -> Account {
    Account {
        lamports: rent.minimum_balance(data.len()).max(1),
        data,
        owner: *loader_key,
        executable: true,
        rent_epoch: 0,
    }
}

enum ProgramEntry {
    Builtin {
        name: String,
        executor: Arc<dyn ProgramExecutor>,
    },
    Deployed {
        executor: Option<Arc<dyn ProgramExecutor>>,
    },
}

/// The programs known to a harness, keyed by program id.
#[derive(Default)]
pub struct ProgramCache {
    entries: HashMap<Pubkey, ProgramEntry>,
    loader: Option<Arc<dyn ProgramLoader>>,
}

impl fmt::Debug for ProgramCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgramCache")
            .field("programs", &self.entries.len())
            .field("loader", &self.loader.is_some())
            .finish()
    }
}

impl ProgramCache {
    pub fn add_builtin(
        &mut self,
        program_id: Pubkey,
        name: &str,
        executor: Arc<dyn ProgramExecutor>,
    ) {
        log::debug!("registering builtin {name} at {program_id}");
        self.entries.insert(
            program_id,
            ProgramEntry::Builtin {
                name: name.to_string(),
                executor,
            },
        );
    }

    pub fn set_loader(&mut self, loader: Arc<dyn ProgramLoader>) {
        self.loader = Some(loader);
    }

    /// Register a deployed program image, resolving its executor through the
    /// configured loader if there is one.
    pub fn add_deployed(&mut self, program_id: Pubkey, elf: &[u8]) -> Result<(), DeployError> {
        let executor = match &self.loader {
            Some(loader) => Some(loader.load(&program_id, elf)?),
            None => {
                log::debug!("no program loader configured, {program_id} will not be executable");
                None
            }
        };
        self.entries
            .insert(program_id, ProgramEntry::Deployed { executor });
        Ok(())
    }

    pub fn builtin_name(&self, program_id: &Pubkey) -> Option<&str> {
        match self.entries.get(program_id) {
            Some(ProgramEntry::Builtin { name, .. }) => Some(name),
            _ => None,
        }
    }

    /// The executor for `program_id`, or `UnsupportedProgramId` when nothing
    /// is able to run it.
    pub fn executor(&self, program_id: &Pubkey) -> Result<Arc<dyn ProgramExecutor>, InstructionError> {
        match self.entries.get(program_id) {
            Some(ProgramEntry::Builtin { executor, .. })
            | Some(ProgramEntry::Deployed {
                executor: Some(executor),
            }) => Ok(Arc::clone(executor)),
            _ => Err(InstructionError::UnsupportedProgramId),
        }
    }
}
