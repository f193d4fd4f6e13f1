//! Legacy transaction wire format
//!
//! Only what a memo write needs: one fee payer, one program, no extra
//! accounts. Lengths use the ledger's compact-u16 encoding.

use super::{memo_program_id, Hash, Pubkey, Signature};

/// Maximum serialized transaction size accepted by the network
pub const PACKET_DATA_SIZE: usize = 1232;

/// Wire bytes could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("unexpected end of input at offset {0}")]
    Truncated(usize),
    #[error("compact length overflows u16")]
    LengthOverflow,
    #[error("versioned messages are not supported")]
    Versioned,
    #[error("instruction references account {index} of {count}")]
    AccountIndex { index: u8, count: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageHeader {
    pub num_required_signatures: u8,
    pub num_readonly_signed: u8,
    pub num_readonly_unsigned: u8,
}

/// Instruction with program and accounts given as indexes into the key list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledInstruction {
    pub program_id_index: u8,
    pub accounts: Vec<u8>,
    pub data: Vec<u8>,
}

/// The signed portion of a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: MessageHeader,
    pub account_keys: Vec<Pubkey>,
    pub recent_blockhash: Hash,
    pub instructions: Vec<CompiledInstruction>,
}

impl Message {
    /// A write whose only instruction is a memo carrying `payload`
    pub fn new_memo(fee_payer: Pubkey, payload: &[u8], recent_blockhash: Hash) -> Self {
        Self {
            header: MessageHeader {
                num_required_signatures: 1,
                num_readonly_signed: 0,
                num_readonly_unsigned: 1,
            },
            account_keys: vec![fee_payer, memo_program_id()],
            recent_blockhash,
            instructions: vec![CompiledInstruction {
                program_id_index: 1,
                accounts: Vec::new(),
                data: payload.to_vec(),
            }],
        }
    }

    pub fn fee_payer(&self) -> Option<&Pubkey> {
        self.account_keys.first()
    }

    /// Keys that must sign, in signature order
    pub fn signer_keys(&self) -> &[Pubkey] {
        let n = (self.header.num_required_signatures as usize).min(self.account_keys.len());
        &self.account_keys[..n]
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(128);
        out.push(self.header.num_required_signatures);
        out.push(self.header.num_readonly_signed);
        out.push(self.header.num_readonly_unsigned);

        encode_len(&mut out, self.account_keys.len());
        for key in &self.account_keys {
            out.extend_from_slice(key.as_bytes());
        }
        out.extend_from_slice(self.recent_blockhash.as_bytes());

        encode_len(&mut out, self.instructions.len());
        for ix in &self.instructions {
            out.push(ix.program_id_index);
            encode_len(&mut out, ix.accounts.len());
            out.extend_from_slice(&ix.accounts);
            encode_len(&mut out, ix.data.len());
            out.extend_from_slice(&ix.data);
        }
        out
    }

    fn deserialize_from(reader: &mut Reader<'_>) -> Result<Self, WireError> {
        let first = reader.byte()?;
        if first & 0x80 != 0 {
            return Err(WireError::Versioned);
        }
        let header = MessageHeader {
            num_required_signatures: first,
            num_readonly_signed: reader.byte()?,
            num_readonly_unsigned: reader.byte()?,
        };

        let key_count = reader.compact_len()?;
        let mut account_keys = Vec::with_capacity(key_count);
        for _ in 0..key_count {
            account_keys.push(Pubkey(reader.array()?));
        }
        let recent_blockhash = Hash(reader.array()?);

        let ix_count = reader.compact_len()?;
        let mut instructions = Vec::with_capacity(ix_count);
        for _ in 0..ix_count {
            let program_id_index = reader.byte()?;
            if program_id_index as usize >= account_keys.len() {
                return Err(WireError::AccountIndex {
                    index: program_id_index,
                    count: account_keys.len(),
                });
            }
            let n = reader.compact_len()?;
            let accounts = reader.take(n)?.to_vec();
            let n = reader.compact_len()?;
            let data = reader.take(n)?.to_vec();
            instructions.push(CompiledInstruction {
                program_id_index,
                accounts,
                data,
            });
        }

        Ok(Self {
            header,
            account_keys,
            recent_blockhash,
            instructions,
        })
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, WireError> {
        Self::deserialize_from(&mut Reader::new(bytes))
    }
}

/// Signatures plus message, as submitted to the network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub signatures: Vec<Signature>,
    pub message: Message,
}

impl Transaction {
    /// Wrap a message with zeroed signature slots for each required signer
    pub fn new_unsigned(message: Message) -> Self {
        let slots = message.header.num_required_signatures as usize;
        Self {
            signatures: vec![Signature::default(); slots],
            message,
        }
    }

    /// Bytes every signer signs over
    pub fn message_bytes(&self) -> Vec<u8> {
        self.message.serialize()
    }

    /// Place `signature` in the slot of `signer`; false if it is not a signer
    pub fn attach_signature(&mut self, signer: &Pubkey, signature: Signature) -> bool {
        match self.message.signer_keys().iter().position(|k| k == signer) {
            Some(index) => {
                self.signatures[index] = signature;
                true
            }
            None => false,
        }
    }

    pub fn is_fully_signed(&self) -> bool {
        self.signatures.iter().all(|s| *s != Signature::default())
    }

    pub fn serialize(&self) -> Vec<u8> {
        let message = self.message.serialize();
        let mut out = Vec::with_capacity(3 + self.signatures.len() * Signature::LEN + message.len());
        encode_len(&mut out, self.signatures.len());
        for sig in &self.signatures {
            out.extend_from_slice(sig.as_bytes());
        }
        out.extend_from_slice(&message);
        out
    }

    /// Parse wire bytes; also returns the message bytes that were signed
    pub fn deserialize(bytes: &[u8]) -> Result<(Self, Vec<u8>), WireError> {
        let mut reader = Reader::new(bytes);
        let count = reader.compact_len()?;
        let mut signatures = Vec::with_capacity(count);
        for _ in 0..count {
            signatures.push(Signature(reader.array()?));
        }
        let message_start = reader.pos;
        let message = Message::deserialize_from(&mut reader)?;
        let message_bytes = bytes[message_start..reader.pos].to_vec();
        Ok((Self { signatures, message }, message_bytes))
    }
}

fn encode_len(out: &mut Vec<u8>, mut len: usize) {
    loop {
        let mut byte = (len & 0x7f) as u8;
        len >>= 7;
        if len == 0 {
            out.push(byte);
            break;
        }
        byte |= 0x80;
        out.push(byte);
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn byte(&mut self) -> Result<u8, WireError> {
        let b = *self.bytes.get(self.pos).ok_or(WireError::Truncated(self.pos))?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        let end = self.pos.checked_add(n).ok_or(WireError::Truncated(self.pos))?;
        let slice = self.bytes.get(self.pos..end).ok_or(WireError::Truncated(self.pos))?;
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let slice = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn compact_len(&mut self) -> Result<usize, WireError> {
        let mut value = 0usize;
        for shift in [0, 7, 14] {
            let byte = self.byte()?;
            value |= ((byte & 0x7f) as usize) << shift;
            if byte & 0x80 == 0 {
                return if value > u16::MAX as usize {
                    Err(WireError::LengthOverflow)
                } else {
                    Ok(value)
                };
            }
        }
        Err(WireError::LengthOverflow)
    }
}
