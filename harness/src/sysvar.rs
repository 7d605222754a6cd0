//! Sysvar accounts held in the account store.
//!
//! Each sysvar lives at its fixed address as a bincode-encoded account owned
//! by the sysvar program. The harness seeds `Clock`, `Rent`, `EpochSchedule`
//! and `SlotHashes` at construction and keeps `Clock` and `SlotHashes` in step
//! with the blockhash queue when warping.

use {
    crate::account_store::AccountsDb,
    serde::{de::DeserializeOwned, Serialize},
    solana_account::Account,
    solana_clock::{Clock, Slot, UnixTimestamp},
    solana_epoch_schedule::EpochSchedule,
    solana_hash::Hash,
    solana_pubkey::Pubkey,
    solana_rent::Rent,
    solana_sdk_ids::sysvar,
    solana_sha256_hasher::hashv,
    solana_slot_hashes::{SlotHashes, MAX_ENTRIES},
    solana_sysvar_id::SysvarId,
};

/// Wall-clock time assumed to pass per slot.
pub const MS_PER_SLOT: i64 = 400;

/// Whether `pubkey` is a reserved sysvar address.
pub fn is_sysvar_id(pubkey: &Pubkey) -> bool {
    sysvar::check_id(pubkey)
        || *pubkey == Clock::id()
        || *pubkey == Rent::id()
        || *pubkey == EpochSchedule::id()
        || *pubkey == SlotHashes::id()
}

/// Decode the sysvar `T` from the store, falling back to its default when
/// the account is missing or undecodable.
pub fn get_sysvar<T>(accounts: &AccountsDb) -> T
where
    T: SysvarId + DeserializeOwned + Default,
{
    accounts
        .get_account_ref(&T::id())
        .and_then(|account| bincode::deserialize(&account.data).ok())
        .unwrap_or_default()
}

/// Encode `value` into its sysvar account, funded to be rent exempt under
/// the current `Rent`.
pub fn set_sysvar<T>(accounts: &mut AccountsDb, value: &T)
where
    T: SysvarId + Serialize,
{
    let data = match bincode::serialize(value) {
        Ok(data) => data,
        Err(err) => {
            log::error!("failed to encode sysvar {}: {err}", T::id());
            return;
        }
    };
    let rent = get_sysvar::<Rent>(accounts);
    let account = Account {
        lamports: rent.minimum_balance(data.len()).max(1),
        data,
        owner: sysvar::id(),
        executable: false,
        rent_epoch: 0,
    };
    if let Err(err) = accounts.set_account(T::id(), account) {
        log::error!("failed to store sysvar {}: {err}", T::id());
    }
}

/// Store the initial set of sysvars.
pub fn seed_sysvars(accounts: &mut AccountsDb, genesis_hash: Hash, unix_timestamp: UnixTimestamp) {
    let rent = Rent::default();
    let epoch_schedule = EpochSchedule::default();
    // Rent first, so the others are funded against it.
    set_sysvar(accounts, &rent);
    set_sysvar(accounts, &epoch_schedule);
    set_sysvar(
        accounts,
        &Clock {
            slot: 0,
            epoch_start_timestamp: unix_timestamp,
            epoch: 0,
            leader_schedule_epoch: epoch_schedule.get_leader_schedule_epoch(0),
            unix_timestamp,
        },
    );
    set_sysvar(accounts, &SlotHashes::new(&[(0, genesis_hash)]));
}

/// Move `Clock` and `SlotHashes` forward to `slot`.
///
/// Every slot between the current one and the target gets a `SlotHashes`
/// entry chained off `latest_blockhash`, limited to the last `MAX_ENTRIES`.
/// Warping backwards rewinds the clock but leaves `SlotHashes` alone.
pub fn warp_sysvars(accounts: &mut AccountsDb, slot: Slot, latest_blockhash: Hash) {
    let epoch_schedule = get_sysvar::<EpochSchedule>(accounts);
    let clock = get_sysvar::<Clock>(accounts);

    if slot > clock.slot {
        let mut slot_hashes = get_sysvar::<SlotHashes>(accounts);
        let first = clock.slot.max(slot.saturating_sub(MAX_ENTRIES as u64));
        for passed in first..slot {
            if slot_hashes.get(&passed).is_none() {
                slot_hashes.add(passed, hashv(&[latest_blockhash.as_ref(), &passed.to_le_bytes()]));
            }
        }
        set_sysvar(accounts, &slot_hashes);
    }

    let elapsed_ms = (i128::from(slot) - i128::from(clock.slot)) * i128::from(MS_PER_SLOT);
    let unix_timestamp = UnixTimestamp::try_from(
        i128::from(clock.unix_timestamp).saturating_add(elapsed_ms / 1000),
    )
    .unwrap_or(if elapsed_ms < 0 {
        UnixTimestamp::MIN
    } else {
        UnixTimestamp::MAX
    });
    let epoch = epoch_schedule.get_epoch(slot);
    let epoch_start_timestamp = if epoch != clock.epoch {
        unix_timestamp
    } else {
        clock.epoch_start_timestamp
    };
    log::debug!("warping clock from slot {} to {slot} (epoch {epoch})", clock.slot);
    set_sysvar(
        accounts,
        &Clock {
            slot,
            epoch_start_timestamp,
            epoch,
            leader_schedule_epoch: epoch_schedule.get_leader_schedule_epoch(slot),
            unix_timestamp,
        },
    );
}
