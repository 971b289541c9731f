use super::model::EncryptionProtocol;
use aes::Aes128;
use cfb_mode::cipher::{NewStreamCipher, StreamCipher};
use cfb_mode::Cfb;

const XML_KEY: [u8; 8] = [0x1F, 0x2D, 0x3C, 0x4B, 0x5A, 0x69, 0x78, 0xFF];
const IV: &[u8] = b"0123456789abcdef";

/// Decrypt a body buffer
///
/// `offset` is the connection's cumulative body byte counter at the start of
/// this buffer. Only BCEncrypt consumes it; the AES modes re-seed from the
/// IV on every call so that no cipher state crosses message boundaries.
pub(crate) fn decrypt(offset: u32, buf: &[u8], encryption_protocol: &EncryptionProtocol) -> Vec<u8> {
    match encryption_protocol {
        EncryptionProtocol::Unencrypted => buf.to_vec(),
        EncryptionProtocol::BCEncrypt => bc_crypt(offset, buf),
        EncryptionProtocol::Aes(aeskey) | EncryptionProtocol::FullAes(aeskey) => {
            let mut decrypted = buf.to_vec();
            Cfb::<Aes128>::new(aeskey.into(), IV.into()).decrypt(&mut decrypted);
            decrypted
        }
    }
}

/// Encrypt a body buffer. See [`decrypt`] for the `offset` contract
pub(crate) fn encrypt(offset: u32, buf: &[u8], encryption_protocol: &EncryptionProtocol) -> Vec<u8> {
    match encryption_protocol {
        EncryptionProtocol::Unencrypted => buf.to_vec(),
        // XOR is an involution, encrypt is the same op
        EncryptionProtocol::BCEncrypt => bc_crypt(offset, buf),
        EncryptionProtocol::Aes(aeskey) | EncryptionProtocol::FullAes(aeskey) => {
            let mut encrypted = buf.to_vec();
            Cfb::<Aes128>::new(aeskey.into(), IV.into()).encrypt(&mut encrypted);
            encrypted
        }
    }
}

/// Decrypt only the first `encrypt_len` bytes of a binary payload
///
/// FullAes cameras send binary payloads whose leading `encryptLen` bytes
/// are ciphertext and whose remainder is cleartext. The cleartext tail must
/// not be fed to the stream cipher.
pub(crate) fn decrypt_prefix(
    offset: u32,
    buf: &[u8],
    encrypt_len: u32,
    encryption_protocol: &EncryptionProtocol,
) -> Vec<u8> {
    let split = (encrypt_len as usize).min(buf.len());
    let mut out = decrypt(offset, &buf[..split], encryption_protocol);
    out.extend_from_slice(&buf[split..]);
    out
}

/// Encrypt only the first `encrypt_len` bytes of a binary payload
pub(crate) fn encrypt_prefix(
    offset: u32,
    buf: &[u8],
    encrypt_len: u32,
    encryption_protocol: &EncryptionProtocol,
) -> Vec<u8> {
    let split = (encrypt_len as usize).min(buf.len());
    let mut out = encrypt(offset, &buf[..split], encryption_protocol);
    out.extend_from_slice(&buf[split..]);
    out
}

fn bc_crypt(offset: u32, buf: &[u8]) -> Vec<u8> {
    // The key index advances with (offset + i) but the second XOR term is
    // the low byte of the starting offset alone
    let key_iter = XML_KEY.iter().cycle().skip(offset as usize % 8);
    key_iter
        .zip(buf)
        .map(|(key, i)| *i ^ key ^ (offset as u8))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 16] = *b"0123456789ABCDEF";

    #[test]
    fn test_bc_crypt_at_offset_zero() {
        let zeros = [0u8; 10];
        let crypted = encrypt(0, &zeros, &EncryptionProtocol::BCEncrypt);
        assert_eq!(
            crypted,
            vec![0x1F, 0x2D, 0x3C, 0x4B, 0x5A, 0x69, 0x78, 0xFF, 0x1F, 0x2D]
        );
    }

    #[test]
    // Catches implementations that wrongly add `i` to the offset byte term
    fn test_bc_crypt_at_offset_three() {
        let ones = [0xFFu8; 5];
        let crypted = encrypt(3, &ones, &EncryptionProtocol::BCEncrypt);
        assert_eq!(crypted, vec![0xB7, 0xA6, 0x95, 0x84, 0x03]);
    }

    #[test]
    fn test_bc_crypt_involution() {
        let sample: Vec<u8> = (0u8..=255).collect();
        for offset in [0u32, 1, 7, 8, 200, 0x1234] {
            let once = encrypt(offset, &sample, &EncryptionProtocol::BCEncrypt);
            let twice = decrypt(offset, &once, &EncryptionProtocol::BCEncrypt);
            assert_eq!(twice, sample);
        }
    }

    #[test]
    fn test_aes_roundtrip_is_stateless() {
        let protocol = EncryptionProtocol::Aes(KEY);
        let sample = b"<body><Preview version=\"1.1\"></Preview></body>";
        // Each op re-seeds from the IV, so decrypting a later message first
        // must still work
        let first = encrypt(0, &sample[..], &protocol);
        let second = encrypt(0, &sample[..], &protocol);
        assert_eq!(first, second);
        assert_eq!(decrypt(0, &second, &protocol), sample.to_vec());
        assert_eq!(decrypt(0, &first, &protocol), sample.to_vec());
    }

    #[test]
    fn test_full_aes_prefix_roundtrip() {
        let protocol = EncryptionProtocol::FullAes(KEY);
        let payload: Vec<u8> = (0u8..200).collect();
        for encrypt_len in [0u32, 1, 15, 16, 17, 199, 200, 500] {
            let wire = encrypt_prefix(0, &payload, encrypt_len, &protocol);
            let split = (encrypt_len as usize).min(payload.len());
            // The tail must be cleartext on the wire
            assert_eq!(&wire[split..], &payload[split..]);
            let back = decrypt_prefix(0, &wire, encrypt_len, &protocol);
            assert_eq!(back, payload);
        }
    }

    #[test]
    fn test_unencrypted_passthrough() {
        let sample = [1u8, 2, 3, 4];
        assert_eq!(
            encrypt(9, &sample, &EncryptionProtocol::Unencrypted),
            sample.to_vec()
        );
        assert_eq!(
            decrypt(9, &sample, &EncryptionProtocol::Unencrypted),
            sample.to_vec()
        );
    }
}
