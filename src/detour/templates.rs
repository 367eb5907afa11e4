/// Detours shared by every Unreal Engine 1 title

use super::spec::{DetourSpec, Fill};
use crate::types::Status;

/// `ULevel* UGameEngine::LoadMap(const FURL&, UPendingLevel*, const TMap<FString,FString>*, FString&)`
///
/// Publishes `Loading` for the duration of the call and copies `URL.Map` (UTF-16,
/// `FURL + 0x1C` holds its data pointer) into the level buffer, truncated to the
/// buffer capacity and always terminated. `eax` from the original call is preserved.
pub const LOAD_MAP: DetourSpec = DetourSpec {
    name: "load_map",
    module: "Engine.dll",
    symbol: "?LoadMap@UGameEngine@@UAEPAVULevel@@ABVFURL@@PAVUPendingLevel@@PBV?$TMap@VFString@@V1@@@AAVFString@@@Z",
    prologue: "55 8B EC 6A FF",
    template: "
        55                  // push ebp
        8B EC               // mov ebp,esp
        51                  // push ecx
        56                  // push esi
        57                  // push edi
        C7 05 #4 #4         // mov dword ptr ds:[<status>],LOADING
        8B 75 08            // mov esi,dword ptr ss:[ebp+8]
        8B 76 1C            // mov esi,dword ptr ds:[esi+1C]
        BF #4               // mov edi,<level>
        B9 #4               // mov ecx,<capacity>
        85 F6               // test esi,esi
        74 14               // je done
        66 8B 06            // copy: mov ax,word ptr ds:[esi]
        66 85 C0            // test ax,ax
        74 0C               // je done
        66 89 07            // mov word ptr ds:[edi],ax
        83 C6 02            // add esi,2
        83 C7 02            // add edi,2
        49                  // dec ecx
        75 EC               // jne copy
        66 C7 07 00 00      // done: mov word ptr ds:[edi],0
        5F                  // pop edi
        5E                  // pop esi
        59                  // pop ecx
        FF 75 14            // push dword ptr ss:[ebp+14]
        FF 75 10            // push dword ptr ss:[ebp+10]
        FF 75 0C            // push dword ptr ss:[ebp+C]
        FF 75 08            // push dword ptr ss:[ebp+8]
        E8 #4               // call <original>
        C7 05 #4 #4         // mov dword ptr ds:[<status>],NONE
        5D                  // pop ebp
        C2 10 00            // ret 10
    ",
    fills: &[
        Fill::StatusCell,
        Fill::Status(Status::Loading),
        Fill::LevelCell,
        Fill::LevelCapacity,
        Fill::CallOriginal,
        Fill::StatusCell,
        Fill::Status(Status::None),
    ],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_map_is_valid() {
        let assembled = LOAD_MAP.validate().unwrap();
        let bytes = assembled.bytes();
        assert_eq!(bytes.first(), Some(&0x55));
        assert_eq!(&bytes[bytes.len() - 3..], &[0xC2, 0x10, 0x00]);
    }

    #[test]
    fn test_load_map_copy_loop_offsets() {
        let assembled = LOAD_MAP.validate().unwrap();
        let bytes = assembled.bytes();

        let je_skip = bytes.windows(2).position(|w| w == [0x74, 0x14]).unwrap();
        let copy = je_skip + 2;
        let done = copy + 0x14;
        assert_eq!(&bytes[done..done + 5], &[0x66, 0xC7, 0x07, 0x00, 0x00]);
        // jne at the end of the loop jumps back to `copy`
        assert_eq!(&bytes[done - 2..done], &[0x75, 0xEC]);
        assert_eq!(&bytes[copy + 6..copy + 8], &[0x74, 0x0C]);
    }
}
